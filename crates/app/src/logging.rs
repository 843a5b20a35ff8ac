//! Diagnostics go to stderr; filtered by `RUST_LOG`, `info` by default.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once, at process start.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
