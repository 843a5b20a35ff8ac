use lambda_bootstrap::{builtin, logging, run};
use lambda_bootstrap_runtime::BootstrapConfig;
use std::process::ExitCode;
use tracing::error;

// One invocation at a time: a single-threaded runtime is all the loop needs.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logging::init();

    let config = match BootstrapConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid bootstrap configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config, builtin::registry()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Bootstrap failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
