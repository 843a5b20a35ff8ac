//! Bootstrap configuration from the process environment.

use crate::interfaces::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

pub const RUNTIME_API_VAR: &str = "AWS_LAMBDA_RUNTIME_API";
pub const TASK_ROOT_VAR: &str = "LAMBDA_TASK_ROOT";
pub const HANDLER_VAR: &str = "_HANDLER";
pub const BACKOFF_INITIAL_VAR: &str = "BOOTSTRAP_BACKOFF_INITIAL_MS";
pub const BACKOFF_MAX_VAR: &str = "BOOTSTRAP_BACKOFF_MAX_MS";

const DEFAULT_BACKOFF_INITIAL_MS: u64 = 100;
const DEFAULT_BACKOFF_MAX_MS: u64 = 5_000;

/// Bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Control-plane authority, `host:port`.
    pub runtime_api: String,
    pub task_root: PathBuf,
    /// Raw `entry::method` reference; validated during resolution.
    pub handler: String,
    pub backoff: BackoffConfig,
}

/// Bounds of the fetch retry backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_BACKOFF_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        }
    }
}

impl BootstrapConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns `ConfigError::Missing` if the runtime API is unset, and
    /// `ConfigError::Invalid` for malformed backoff bounds.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let runtime_api = lookup(RUNTIME_API_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::Missing(RUNTIME_API_VAR.to_string()))?;

        let task_root = lookup(TASK_ROOT_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let handler = lookup(HANDLER_VAR).unwrap_or_default();

        let initial = parse_millis(&lookup, BACKOFF_INITIAL_VAR, DEFAULT_BACKOFF_INITIAL_MS)?;
        let max = parse_millis(&lookup, BACKOFF_MAX_VAR, DEFAULT_BACKOFF_MAX_MS)?;
        if initial > max {
            return Err(ConfigError::Invalid {
                name: BACKOFF_INITIAL_VAR.to_string(),
                reason: format!(
                    "initial backoff {}ms exceeds maximum {}ms",
                    initial.as_millis(),
                    max.as_millis()
                ),
            });
        }

        Ok(Self {
            runtime_api,
            task_root,
            handler,
            backoff: BackoffConfig { initial, max },
        })
    }
}

fn parse_millis<F>(lookup: &F, name: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(Duration::from_millis(default));
    };
    let millis: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        name: name.to_string(),
        reason: format!("'{}': {}", raw, e),
    })?;
    if millis == 0 {
        return Err(ConfigError::Invalid {
            name: name.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}
