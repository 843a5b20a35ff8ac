//! Compiled-in entry points and method binding.

use crate::interfaces::{Handler, InitError, InvocationError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// A named unit of user code exposing callable methods.
#[async_trait]
pub trait EntryPoint: Send + Sync {
    /// Callable member names, in declaration order.
    fn methods(&self) -> Vec<String>;

    /// Call a member with one payload.
    async fn call(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Constructs a fresh entry point instance.
pub type EntryPointFactory = Arc<dyn Fn() -> Result<Arc<dyn EntryPoint>, String> + Send + Sync>;

/// Entry points linked into the bootstrap, keyed by entry path.
#[derive(Default)]
pub struct EntryPointRegistry {
    factories: HashMap<String, EntryPointFactory>,
}

impl EntryPointRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under an entry path. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, entry_path: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn EntryPoint>, String> + Send + Sync + 'static,
    {
        self.factories.insert(entry_path.into(), Arc::new(factory));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the entry point, if registered.
    ///
    /// A factory that panics is reported as a failed construction.
    pub fn instantiate(&self, entry_path: &str) -> Option<Result<Arc<dyn EntryPoint>, String>> {
        self.factories.get(entry_path).map(|factory| {
            let construct = &**factory;
            catch_unwind(AssertUnwindSafe(construct))
                .unwrap_or_else(|payload| Err(format!("panicked: {}", panic_message(payload))))
        })
    }
}

/// A method bound to a single entry point instance.
pub struct BoundMethod {
    entry_path: String,
    method: String,
    instance: Arc<dyn EntryPoint>,
}

impl BoundMethod {
    /// Bind `method` on `instance`.
    ///
    /// When the name is declared more than once the first declaration wins.
    /// A panic while listing methods means the entry point cannot be loaded.
    pub fn bind(
        entry_path: &str,
        instance: Arc<dyn EntryPoint>,
        method: &str,
    ) -> Result<Self, InitError> {
        let declared = catch_unwind(AssertUnwindSafe(|| instance.methods())).map_err(|payload| {
            InitError::EntryPointNotFound {
                entry: entry_path.to_string(),
                reason: format!("panicked while listing methods: {}", panic_message(payload)),
            }
        })?;

        let matches = declared
            .iter()
            .filter(|name| name.as_str() == method)
            .count();

        if matches == 0 {
            return Err(InitError::MethodNotFound {
                entry: entry_path.to_string(),
                method: method.to_string(),
            });
        }
        if matches > 1 {
            warn!(
                "Method '{}' is declared {} times on '{}'; using the first match",
                method, matches, entry_path
            );
        }

        Ok(Self {
            entry_path: entry_path.to_string(),
            method: method.to_string(),
            instance,
        })
    }

    pub fn entry_path(&self) -> &str {
        &self.entry_path
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

#[async_trait]
impl Handler for BoundMethod {
    async fn invoke(&self, payload: &[u8]) -> Result<Vec<u8>, InvocationError> {
        let instance = Arc::clone(&self.instance);
        let method = self.method.clone();
        let payload = payload.to_vec();

        // Spawn to isolate panics raised by user code
        let handle = tokio::spawn(async move { instance.call(&method, payload).await });

        match handle.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(InvocationError::new(message)),
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!("Handler {}::{} panicked: {}", self.entry_path, self.method, message);
                Err(InvocationError::new(format!("Handler panicked: {message}")))
            }
            Err(_) => Err(InvocationError::new("Handler invocation was cancelled")),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    struct Greeter;

    #[async_trait]
    impl EntryPoint for Greeter {
        fn methods(&self) -> Vec<String> {
            vec!["greet".to_string(), "fail".to_string(), "explode".to_string()]
        }

        async fn call(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, String> {
            match method {
                "greet" => Ok(format!("hello {}", String::from_utf8_lossy(&payload)).into_bytes()),
                "fail" => Err("greeting refused".to_string()),
                _ => panic!("kaboom"),
            }
        }
    }

    struct Overloaded;

    #[async_trait]
    impl EntryPoint for Overloaded {
        fn methods(&self) -> Vec<String> {
            vec!["handle".to_string(), "handle".to_string()]
        }

        async fn call(&self, _method: &str, payload: Vec<u8>) -> Result<Vec<u8>, String> {
            Ok(payload)
        }
    }

    #[test]
    fn test_registry_instantiates_registered_entry() {
        let mut registry = EntryPointRegistry::new();
        registry.register("demo.Greeter", || Ok(Arc::new(Greeter) as Arc<dyn EntryPoint>));

        assert_eq!(registry.names(), vec!["demo.Greeter".to_string()]);
        assert!(registry.instantiate("demo.Greeter").unwrap().is_ok());
        assert!(registry.instantiate("demo.Missing").is_none());
    }

    struct Unlistable;

    #[async_trait]
    impl EntryPoint for Unlistable {
        fn methods(&self) -> Vec<String> {
            panic!("method table corrupted")
        }

        async fn call(&self, _method: &str, payload: Vec<u8>) -> Result<Vec<u8>, String> {
            Ok(payload)
        }
    }

    #[test]
    fn test_registry_panicking_factory_is_failed_construction() {
        let mut registry = EntryPointRegistry::new();
        registry.register("demo.Boom", || -> Result<Arc<dyn EntryPoint>, String> {
            panic!("static init blew up")
        });

        match registry.instantiate("demo.Boom") {
            Some(Err(reason)) => assert!(reason.contains("static init blew up")),
            _ => panic!("Expected failed construction"),
        }
    }

    #[test]
    fn test_bind_panicking_methods_is_not_found() {
        match BoundMethod::bind("demo.Unlistable", Arc::new(Unlistable), "handle") {
            Err(InitError::EntryPointNotFound { entry, reason }) => {
                assert_eq!(entry, "demo.Unlistable");
                assert!(reason.contains("method table corrupted"));
            }
            _ => panic!("Expected EntryPointNotFound"),
        }
    }

    #[test]
    fn test_bind_missing_method() {
        let result = BoundMethod::bind("demo.Greeter", Arc::new(Greeter), "wave");
        assert!(matches!(result, Err(InitError::MethodNotFound { .. })));
    }

    #[test]
    fn test_bind_duplicate_method_first_wins() {
        let bound = BoundMethod::bind("demo.Overloaded", Arc::new(Overloaded), "handle").unwrap();
        assert_eq!(bound.method(), "handle");
        assert_eq!(bound.entry_path(), "demo.Overloaded");
    }

    #[tokio::test]
    async fn test_bound_method_invokes() {
        let bound = BoundMethod::bind("demo.Greeter", Arc::new(Greeter), "greet").unwrap();
        let result = bound.invoke(b"world").await.unwrap();
        assert_eq!(result, b"hello world");
    }

    #[tokio::test]
    async fn test_bound_method_error_is_runtime_error() {
        let bound = BoundMethod::bind("demo.Greeter", Arc::new(Greeter), "fail").unwrap();
        let err = bound.invoke(b"").await.unwrap_err();
        assert_eq!(err.message, "greeting refused");
        assert_eq!(err.error_type, "RuntimeError");
    }

    #[tokio::test]
    async fn test_bound_method_panic_is_isolated() {
        let bound = BoundMethod::bind("demo.Greeter", Arc::new(Greeter), "explode").unwrap();
        let err = bound.invoke(b"").await.unwrap_err();
        assert!(err.message.contains("kaboom"));
        assert_eq!(err.error_type, "RuntimeError");
    }
}
