//! Store error types.

use quill_core::QuillError;
use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while talking to the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// A single round trip exceeded the configured bound.
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store is switched off.
    #[error("Store is offline")]
    Offline,

    /// The store answered with something the client cannot interpret.
    #[error("Unexpected store reply: {0}")]
    Protocol(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<StoreError> for QuillError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Configuration(message) => Self::Configuration(message),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}
