//! Configuration management for Windowgate.
//!
//! Values are read once at startup and stay immutable for the process
//! lifetime. [`GateConfig::load`] layers an optional config file under
//! `GATE_`-prefixed environment variables, e.g. `GATE_RATE_LIMIT_REQUESTS=50`
//! or `GATE_STORAGE__BACKEND=redis`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::error::{GateError, Result};

/// Main configuration for the Windowgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// HTTP server address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Maximum admitted requests per identity within one window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,

    /// Length of the sliding window in seconds
    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,

    /// Path prefixes subject to rate limiting
    #[serde(default = "default_protected_prefixes")]
    pub rate_limit_protected_prefixes: Vec<String>,

    /// Namespace prepended to identity keys in the window store
    #[serde(default = "default_key_prefix")]
    pub rate_limit_key_prefix: String,

    /// What to do when the window store cannot be reached
    #[serde(default)]
    pub store_failure_policy: StoreFailurePolicy,

    /// Window store configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window_seconds(),
            rate_limit_protected_prefixes: default_protected_prefixes(),
            rate_limit_key_prefix: default_key_prefix(),
            store_failure_policy: StoreFailurePolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_window_seconds() -> u64 {
    60
}

fn default_protected_prefixes() -> Vec<String> {
    vec!["/api/".to_string(), "/health/".to_string()]
}

fn default_key_prefix() -> String {
    "rl:".to_string()
}

/// Behaviour of the gate when the window store fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Let the request through and log a warning
    #[default]
    FailOpen,
    /// Reject the request as if the quota were exhausted
    FailClosed,
}

/// Which window store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map; counts are per instance
    #[default]
    Memory,
    /// Shared Redis cache; counts are shared by every instance using it
    Redis,
}

/// Window store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: StorageBackend,

    /// Redis connection URL, required for the redis backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Upper bound on a single store round-trip in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// How often the memory store sweeps expired windows
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            redis_url: None,
            operation_timeout_ms: default_operation_timeout_ms(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_operation_timeout_ms() -> u64 {
    250
}

fn default_purge_interval_secs() -> u64 {
    60
}

impl StorageConfig {
    /// Get the store operation timeout.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Get the memory store purge interval.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

impl GateConfig {
    /// Get the sliding window length.
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse gate config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file overlaid with `GATE_*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path, "Loading gate configuration");
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("GATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("rate_limit_protected_prefixes"),
            )
            .build()?;

        let config: GateConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_requests == 0 {
            return Err(GateError::Config(
                "rate_limit_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limit_window_seconds == 0 {
            return Err(GateError::Config(
                "rate_limit_window_seconds must be at least 1".to_string(),
            ));
        }
        if self.storage.operation_timeout_ms == 0 {
            return Err(GateError::Config(
                "storage.operation_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.storage.purge_interval_secs == 0 {
            return Err(GateError::Config(
                "storage.purge_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Redis && self.storage.redis_url.is_none() {
            return Err(GateError::Config(
                "storage.redis_url is required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }
}
