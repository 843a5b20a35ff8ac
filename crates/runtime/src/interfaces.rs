//! Error taxonomy and the abstract seams of the bootstrap.

use crate::types::{ErrorEnvelope, InvocationEvent, RUNTIME_ERROR_TYPE};
use async_trait::async_trait;
use thiserror::Error;

/// Fatal failures while resolving the handler.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Malformed handler reference '{0}': expected <entry>::<method>")]
    MalformedHandlerReference(String),

    #[error("Entry point '{entry}' not found: {reason}")]
    EntryPointNotFound { entry: String, reason: String },

    #[error("Method '{method}' not found on entry point '{entry}'")]
    MethodNotFound { entry: String, method: String },
}

/// A handler invocation that raised or returned abnormally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error_type}: {message}")]
pub struct InvocationError {
    pub message: String,
    pub error_type: String,
}

impl InvocationError {
    /// Invocation error carrying the generic `RuntimeError` tag.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: RUNTIME_ERROR_TYPE.to_string(),
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.message.clone(), self.error_type.clone())
    }
}

/// HTTP-level failures talking to the control plane.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} is missing header {header}")]
    MissingHeader { url: String, header: String },

    #[error("Failed to encode body for {url}: {reason}")]
    Encode { url: String, reason: String },
}

impl TransportError {
    /// URL of the failed request.
    pub fn url(&self) -> &str {
        match self {
            TransportError::Request { url, .. }
            | TransportError::Status { url, .. }
            | TransportError::MissingHeader { url, .. }
            | TransportError::Encode { url, .. } => url,
        }
    }
}

/// Invalid process configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Top-level bootstrap errors.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Init error: {0}")]
    Init(#[from] InitError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// An invocable handler bound once at startup.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Invoke the handler with one opaque payload.
    async fn invoke(&self, payload: &[u8]) -> Result<Vec<u8>, InvocationError>;
}

/// Control-plane operations used by the invocation loop.
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    /// Long-poll for the next invocation event.
    async fn next_invocation(&self) -> Result<InvocationEvent, TransportError>;

    /// Report a successful result.
    async fn post_response(&self, request_id: &str, body: Vec<u8>) -> Result<(), TransportError>;

    /// Report a failed invocation.
    async fn post_invocation_error(
        &self,
        request_id: &str,
        error: &ErrorEnvelope,
    ) -> Result<(), TransportError>;

    /// Report a failed initialization.
    async fn post_init_error(&self, error: &ErrorEnvelope) -> Result<(), TransportError>;
}
