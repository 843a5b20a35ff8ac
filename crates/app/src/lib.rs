//! Bootstrap wiring: configuration, built-in entry points and the run entry point.

pub mod builtin;
pub mod logging;

use lambda_bootstrap_runtime::{
    BootstrapConfig, BootstrapError, EntryPointRegistry, HandlerResolver, RuntimeApiClient,
    RuntimeLoop,
};
use std::sync::Arc;
use tracing::info;

/// Resolve the configured handler and serve invocations.
///
/// Returns only when startup fails: either the runtime API authority is
/// unusable or the handler could not be resolved, in which case the init error
/// has already been reported to the control plane.
pub async fn run(config: BootstrapConfig, registry: EntryPointRegistry) -> Result<(), BootstrapError> {
    info!(
        "Starting bootstrap: runtime_api={}, task_root={}, handler={}",
        config.runtime_api,
        config.task_root.display(),
        config.handler
    );

    let client = RuntimeApiClient::new(&config.runtime_api)?;
    let resolver = HandlerResolver::new(Arc::new(registry));

    let mut runtime = RuntimeLoop::initialize(
        client,
        &resolver,
        &config.task_root,
        &config.handler,
        config.backoff,
    )
    .await?;

    runtime.run().await;
    Ok(())
}
