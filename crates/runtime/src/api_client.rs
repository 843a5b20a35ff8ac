//! HTTP client for the runtime control plane.

use crate::interfaces::{ConfigError, RuntimeApi, TransportError};
use crate::types::{ErrorEnvelope, InvocationEvent, API_VERSION, REQUEST_ID_HEADER};
use async_trait::async_trait;
use reqwest::Url;
use std::collections::BTreeMap;
use tracing::debug;

/// Control-plane client.
///
/// No request timeout is set: fetching the next invocation is a long poll that
/// may block for as long as the platform has no work.
#[derive(Clone)]
pub struct RuntimeApiClient {
    base_url: Url,
    client: reqwest::Client,
}

impl RuntimeApiClient {
    /// Create a client for a `host:port` authority.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if the authority does not form an HTTP URL.
    pub fn new(runtime_api: &str) -> Result<Self, ConfigError> {
        Self::with_client(runtime_api, reqwest::Client::new())
    }

    /// Create a client with a preconfigured `reqwest::Client`.
    pub fn with_client(runtime_api: &str, client: reqwest::Client) -> Result<Self, ConfigError> {
        let authority = runtime_api.trim().trim_end_matches('/');
        let raw = if authority.starts_with("http://") || authority.starts_with("https://") {
            format!("{}/{}", authority, API_VERSION)
        } else {
            format!("http://{}/{}", authority, API_VERSION)
        };

        let base_url = Url::parse(&raw).map_err(|e| invalid_authority(runtime_api, e))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid_authority(runtime_api, "not a hierarchical URL"));
        }
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn next_url(&self) -> String {
        self.endpoint(&["runtime", "invocation", "next"])
    }

    /// Request ids are percent-encoded as a single path segment.
    pub fn response_url(&self, request_id: &str) -> String {
        self.endpoint(&["runtime", "invocation", request_id, "response"])
    }

    pub fn invocation_error_url(&self, request_id: &str) -> String {
        self.endpoint(&["runtime", "invocation", request_id, "error"])
    }

    pub fn init_error_url(&self) -> String {
        self.endpoint(&["runtime", "init", "error"])
    }

    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        // Always Ok: the constructor rejects cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }

    async fn post(&self, url: String, body: Vec<u8>) -> Result<(), TransportError> {
        debug!("POST {} ({} bytes)", url, body.len());
        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        check_status(&url, response.status())?;
        // Drain the body so the connection can be reused
        response.bytes().await.map_err(|e| request_error(&url, e))?;
        Ok(())
    }

    async fn post_error(&self, url: String, error: &ErrorEnvelope) -> Result<(), TransportError> {
        let body = error.to_json().map_err(|e| TransportError::Encode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        self.post(url, body.into_bytes()).await
    }
}

#[async_trait]
impl RuntimeApi for RuntimeApiClient {
    async fn next_invocation(&self) -> Result<InvocationEvent, TransportError> {
        let url = self.next_url();
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        check_status(&url, response.status())?;
        let headers = capture_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(&url, e))?
            .to_vec();

        InvocationEvent::from_parts(headers, body).ok_or_else(|| TransportError::MissingHeader {
            url,
            header: REQUEST_ID_HEADER.to_string(),
        })
    }

    async fn post_response(&self, request_id: &str, body: Vec<u8>) -> Result<(), TransportError> {
        self.post(self.response_url(request_id), body).await
    }

    async fn post_invocation_error(
        &self,
        request_id: &str,
        error: &ErrorEnvelope,
    ) -> Result<(), TransportError> {
        self.post_error(self.invocation_error_url(request_id), error)
            .await
    }

    async fn post_init_error(&self, error: &ErrorEnvelope) -> Result<(), TransportError> {
        self.post_error(self.init_error_url(), error).await
    }
}

/// Capture headers as lowercase name -> values in wire order.
fn capture_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut captured: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        captured
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    captured
}

fn invalid_authority(runtime_api: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name: crate::config::RUNTIME_API_VAR.to_string(),
        reason: format!("'{}' is not a valid authority: {}", runtime_api, reason),
    }
}

fn check_status(url: &str, status: reqwest::StatusCode) -> Result<(), TransportError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn request_error(url: &str, error: reqwest::Error) -> TransportError {
    TransportError::Request {
        url: url.to_string(),
        reason: error.to_string(),
    }
}
