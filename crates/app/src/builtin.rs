//! Entry points compiled into the bootstrap binary.

use async_trait::async_trait;
use lambda_bootstrap_runtime::{EntryPoint, EntryPointRegistry};
use std::sync::Arc;

pub const ECHO_ENTRY: &str = "bootstrap.Echo";

/// Returns every payload unchanged; useful for smoke-testing an environment.
pub struct Echo;

#[async_trait]
impl EntryPoint for Echo {
    fn methods(&self) -> Vec<String> {
        vec!["handle".to_string()]
    }

    async fn call(&self, _method: &str, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        Ok(payload)
    }
}

/// Registry of the built-in entry points.
pub fn registry() -> EntryPointRegistry {
    let mut registry = EntryPointRegistry::new();
    registry.register(ECHO_ENTRY, || Ok(Arc::new(Echo) as Arc<dyn EntryPoint>));
    registry
}
