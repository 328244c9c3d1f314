//! Unified error types for the Quill caching and throttling layer.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for Quill.
///
/// Store failures, configuration mistakes and throttling outcomes all flow
/// through this enum so that every crate can propagate with `?` and the HTTP
/// layer can render a consistent response.
#[derive(Error, Debug)]
pub enum QuillError {
    // ============ Store Errors ============
    /// The shared key-value store could not be reached or answered with an error
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // ============ Caller Errors ============
    /// Call arguments could not be turned into a cache key
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// A policy, timeout or identity was rejected before touching the store
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ============ Throttling ============
    /// The caller exceeded a rate-limit policy
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Duration,
    },

    // ============ Infrastructure Errors ============
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cached payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuillError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::KeyGeneration(_) | Self::InvalidConfiguration(_) => 400,
            Self::RateLimited { .. } => 429,
            Self::StoreUnavailable(_) => 503,
            Self::Configuration(_) | Self::Serialization(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::KeyGeneration(_) => "KEY_GENERATION_ERROR",
            Self::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a store-unavailable error.
    #[must_use]
    pub fn store_unavailable<T: Into<String>>(message: T) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates an invalid-configuration error.
    #[must_use]
    pub fn invalid_configuration<T: Into<String>>(message: T) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Creates a rate-limited error carrying the advised wait.
    #[must_use]
    pub fn rate_limited<T: Into<String>>(message: T, retry_after: Duration) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// True when the error came from the shared store rather than the caller.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Seconds the caller should wait, rounded up, for throttling errors.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(ceil_secs(*retry_after)),
            _ => None,
        }
    }
}

/// Rounds a duration up to whole seconds, never below one.
#[must_use]
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

impl From<serde_json::Error> for QuillError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Serializable error response for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Seconds to wait before retrying, for throttled requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    /// Creates a new error response from a `QuillError`.
    #[must_use]
    pub fn from_error(error: &QuillError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            retry_after: error.retry_after_secs(),
        }
    }
}

impl From<&QuillError> for ErrorResponse {
    fn from(error: &QuillError) -> Self {
        Self::from_error(error)
    }
}
