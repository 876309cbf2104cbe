//! Error types for the Windowgate service.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Windowgate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The window store could not serve a request
    #[error("Window store error: {0}")]
    Store(String),

    /// A window store operation exceeded its latency bound
    #[error("Window store operation timed out after {0:?}")]
    StoreTimeout(Duration),

    /// Redis backend errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Stored window could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for Windowgate operations.
pub type Result<T> = std::result::Result<T, GateError>;
