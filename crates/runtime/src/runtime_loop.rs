//! Invocation loop - the bootstrap's state machine.

use crate::config::BackoffConfig;
use crate::interfaces::{Handler, InitError, RuntimeApi, TransportError};
use crate::resolver::HandlerResolver;
use crate::types::{ErrorEnvelope, InvocationEvent};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// States of the invocation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Ready,
    Fetching,
    Invoking,
    Reporting,
    FailedInit,
}

/// Result of one fetch → invoke → report cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The handler succeeded and the response was posted.
    Succeeded { request_id: String },
    /// The handler failed and the error was posted.
    Failed { request_id: String },
    /// The outcome could not be delivered to the control plane.
    ReportFailed { request_id: String },
}

/// Exponential backoff between failed fetches.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Next delay: starts at the initial bound and doubles up to the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.config.initial,
            Some(previous) => previous.saturating_mul(2).min(self.config.max),
        };
        self.current = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Owns the control-plane client and the resolved handler.
pub struct RuntimeLoop<A: RuntimeApi> {
    api: A,
    handler: Arc<dyn Handler>,
    backoff: Backoff,
    state: LoopState,
}

impl<A: RuntimeApi> RuntimeLoop<A> {
    /// Create a loop around an already resolved handler.
    pub fn new(api: A, handler: Arc<dyn Handler>, backoff: BackoffConfig) -> Self {
        Self {
            api,
            handler,
            backoff: Backoff::new(backoff),
            state: LoopState::Ready,
        }
    }

    /// Resolve the handler and build the loop.
    ///
    /// On failure the init error is posted to the control plane exactly once and
    /// returned; the caller must not enter the loop.
    pub async fn initialize(
        api: A,
        resolver: &HandlerResolver,
        task_root: &Path,
        handler_ref: &str,
        backoff: BackoffConfig,
    ) -> Result<Self, InitError> {
        debug!("State: {:?}", LoopState::Initializing);

        match resolver.resolve(task_root, handler_ref) {
            Ok(handler) => {
                info!("Handler {} ready", handler_ref);
                Ok(Self::new(api, handler, backoff))
            }
            Err(err) => {
                error!("Handler resolution failed: {}", err);
                debug!("State: {:?}", LoopState::FailedInit);
                let envelope = ErrorEnvelope::init(err.to_string());
                if let Err(post_err) = api.post_init_error(&envelope).await {
                    error!("Failed to report init error: {}", post_err);
                }
                Err(err)
            }
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run forever. Individual failures never end the loop.
    pub async fn run(&mut self) {
        info!("Entering invocation loop");
        loop {
            match self.run_once().await {
                Ok(outcome) => {
                    debug!("Cycle finished: {:?}", outcome);
                    self.backoff.reset();
                }
                Err(err) => {
                    let delay = self.backoff.next_delay();
                    error!(
                        "Failed to fetch next invocation: {}; retrying in {}ms",
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Perform one fetch → invoke → report cycle.
    ///
    /// Only a failed fetch is returned as an error. Handler and reporting
    /// failures are handled inside the cycle.
    pub async fn run_once(&mut self) -> Result<CycleOutcome, TransportError> {
        self.transition(LoopState::Fetching);
        let event = match self.api.next_invocation().await {
            Ok(event) => event,
            Err(err) => {
                self.transition(LoopState::Ready);
                return Err(err);
            }
        };

        let span = info_span!("invocation", request_id = %event.request_id);
        let outcome = self.process(event).instrument(span).await;
        self.transition(LoopState::Ready);
        Ok(outcome)
    }

    async fn process(&mut self, event: InvocationEvent) -> CycleOutcome {
        info!(
            "Received invocation ({} bytes, deadline={:?}, arn={:?}, trace={:?})",
            event.body.len(),
            event.deadline_ms(),
            event.function_arn(),
            event.trace_id()
        );

        self.transition(LoopState::Invoking);
        let result = self.handler.invoke(&event.body).await;

        self.transition(LoopState::Reporting);
        let request_id = event.request_id;
        match result {
            Ok(body) => match self.api.post_response(&request_id, body).await {
                Ok(()) => {
                    info!("Invocation succeeded");
                    CycleOutcome::Succeeded { request_id }
                }
                Err(err) => {
                    error!("Failed to post response: {}", err);
                    CycleOutcome::ReportFailed { request_id }
                }
            },
            Err(invocation_err) => {
                warn!("Invocation failed: {}", invocation_err);
                let envelope = invocation_err.to_envelope();
                match self.api.post_invocation_error(&request_id, &envelope).await {
                    Ok(()) => CycleOutcome::Failed { request_id },
                    Err(err) => {
                        error!("Failed to post invocation error: {}", err);
                        CycleOutcome::ReportFailed { request_id }
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!("State: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
