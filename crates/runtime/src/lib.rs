//! Lambda Bootstrap Runtime
//!
//! Resolves a user handler once, then polls the runtime control plane for
//! invocations, runs the handler and reports each outcome.

pub mod types;
pub mod interfaces;
pub mod config;
pub mod entry_point;
pub mod process_handler;
pub mod resolver;
pub mod api_client;
pub mod runtime_loop;

pub use types::{ErrorEnvelope, HandlerReference, InvocationEvent, API_VERSION};
pub use interfaces::{
    BootstrapError, ConfigError, Handler, InitError, InvocationError, RuntimeApi, TransportError,
};
pub use config::{BackoffConfig, BootstrapConfig};
pub use entry_point::{BoundMethod, EntryPoint, EntryPointRegistry};
pub use process_handler::ExecutableHandler;
pub use resolver::{HandlerResolver, SearchPath};
pub use api_client::RuntimeApiClient;
pub use runtime_loop::{Backoff, CycleOutcome, LoopState, RuntimeLoop};
