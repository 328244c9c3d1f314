//! Configuration validation module.
//!
//! Collects every problem in a configuration tree so the server can refuse
//! to start with a complete report instead of failing on the first request.

use crate::AppConfig;
use std::fmt;
use std::net::IpAddr;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Port number is invalid (must be 1-65535).
    InvalidPort { name: String, value: u16 },
    /// Pool size must be at least one.
    EmptyPool,
    /// Pool size exceeds maximum allowed.
    PoolSizeTooLarge { value: u32, maximum: u32 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Timeout value must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Rate-limit window must be positive.
    NonPositiveWindow { action: String },
    /// Action names are the last window-key segment and cannot contain `:`.
    InvalidActionName { action: String },
    /// Trusted proxy entry is not an IP address.
    InvalidTrustedProxy { value: String },
    /// Admin token is set but empty.
    EmptyAdminToken,
    /// Key prefix must not be empty.
    EmptyKeyPrefix { name: String },
    /// Cache and rate-limit namespaces overlap.
    PrefixCollision { cache: String, rate_limit: String },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Log format is invalid.
    InvalidLogFormat { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { name, value } => {
                write!(f, "Invalid port for {}: {} (must be 1-65535)", name, value)
            }
            Self::EmptyPool => write!(f, "Redis pool size must be at least 1"),
            Self::PoolSizeTooLarge { value, maximum } => {
                write!(f, "Pool size {} exceeds maximum allowed ({})", value, maximum)
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::NonPositiveWindow { action } => {
                write!(f, "Rate-limit window for '{}' must be positive", action)
            }
            Self::InvalidActionName { action } => {
                write!(f, "Rate-limit action '{}' must be non-empty and must not contain ':'", action)
            }
            Self::InvalidTrustedProxy { value } => {
                write!(f, "Trusted proxy '{}' is not an IP address", value)
            }
            Self::EmptyAdminToken => write!(f, "server.admin_token cannot be empty"),
            Self::EmptyKeyPrefix { name } => write!(f, "Key prefix '{}' cannot be empty", name),
            Self::PrefixCollision { cache, rate_limit } => {
                write!(
                    f,
                    "Cache prefix '{}' and rate-limit prefix '{}' must not overlap",
                    cache, rate_limit
                )
            }
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                    value
                )
            }
            Self::InvalidLogFormat { value } => {
                write!(f, "Invalid log format: '{}' (valid: pretty, json)", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result of configuration validation containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ConfigValidationError>,
}

impl ValidationResult {
    fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the validation errors.
    pub fn errors(&self) -> &[ConfigValidationError] {
        &self.errors
    }

    /// Converts to Result, returning Err with all errors if any exist.
    pub fn into_result(self) -> Result<(), Vec<ConfigValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: u32 = 1000;
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];
    /// Valid log formats.
    const VALID_LOG_FORMATS: &'static [&'static str] = &["pretty", "json"];

    /// Validates the entire application configuration.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut result = ValidationResult::default();

        Self::validate_server(&config.server, &mut result);
        Self::validate_redis(&config.redis, &mut result);
        Self::validate_cache(&config.cache, &mut result);
        Self::validate_rate_limit(&config.rate_limit, &mut result);
        Self::validate_namespaces(config, &mut result);
        Self::validate_observability(&config.observability, &mut result);

        result.into_result()
    }

    fn validate_server(config: &crate::ServerConfig, result: &mut ValidationResult) {
        if config.port == 0 {
            result.add_error(ConfigValidationError::InvalidPort {
                name: "server.port".to_string(),
                value: config.port,
            });
        }
        if config.request_timeout_secs == 0 {
            result.add_error(ConfigValidationError::NonPositiveTimeout {
                name: "server.request_timeout_secs".to_string(),
                value: 0,
            });
        }
        for proxy in &config.trusted_proxies {
            if proxy.trim().parse::<IpAddr>().is_err() {
                result.add_error(ConfigValidationError::InvalidTrustedProxy {
                    value: proxy.clone(),
                });
            }
        }
        if config.admin_token.as_deref().is_some_and(|token| token.trim().is_empty()) {
            result.add_error(ConfigValidationError::EmptyAdminToken);
        }
    }

    fn validate_redis(config: &crate::RedisConfig, result: &mut ValidationResult) {
        if !config.enabled {
            return;
        }

        match Url::parse(&config.url) {
            Ok(url) if matches!(url.scheme(), "redis" | "rediss") => {}
            Ok(_) => result.add_error(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            }),
            Err(e) => result.add_error(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            }),
        }

        if config.pool_size == 0 {
            result.add_error(ConfigValidationError::EmptyPool);
        } else if config.pool_size > Self::MAX_POOL_SIZE {
            result.add_error(ConfigValidationError::PoolSizeTooLarge {
                value: config.pool_size,
                maximum: Self::MAX_POOL_SIZE,
            });
        }

        if config.operation_timeout_ms == 0 {
            result.add_error(ConfigValidationError::NonPositiveTimeout {
                name: "redis.operation_timeout_ms".to_string(),
                value: 0,
            });
        }
    }

    fn validate_cache(config: &crate::CacheConfig, result: &mut ValidationResult) {
        if config.key_prefix.is_empty() {
            result.add_error(ConfigValidationError::EmptyKeyPrefix {
                name: "cache.key_prefix".to_string(),
            });
        }
        if config.default_timeout_secs == 0 {
            result.add_error(ConfigValidationError::NonPositiveTimeout {
                name: "cache.default_timeout_secs".to_string(),
                value: 0,
            });
        }
        for (operation, secs) in &config.timeouts {
            if *secs == 0 {
                result.add_error(ConfigValidationError::NonPositiveTimeout {
                    name: format!("cache.timeouts.{}", operation),
                    value: 0,
                });
            }
        }
    }

    fn validate_rate_limit(config: &crate::RateLimitConfig, result: &mut ValidationResult) {
        if config.key_prefix.is_empty() {
            result.add_error(ConfigValidationError::EmptyKeyPrefix {
                name: "rate_limit.key_prefix".to_string(),
            });
        }
        if config.default.window_secs == 0 {
            result.add_error(ConfigValidationError::NonPositiveWindow {
                action: "default".to_string(),
            });
        }
        for (action, limits) in &config.actions {
            if action.is_empty() || action.contains(':') {
                result.add_error(ConfigValidationError::InvalidActionName {
                    action: action.clone(),
                });
            }
            if limits.window_secs == 0 {
                result.add_error(ConfigValidationError::NonPositiveWindow {
                    action: action.clone(),
                });
            }
        }
    }

    fn validate_namespaces(config: &AppConfig, result: &mut ValidationResult) {
        let cache = &config.cache.key_prefix;
        let rate_limit = &config.rate_limit.key_prefix;
        if cache.is_empty() || rate_limit.is_empty() {
            return;
        }

        let overlaps = cache == rate_limit
            || cache.starts_with(&format!("{}:", rate_limit))
            || rate_limit.starts_with(&format!("{}:", cache));
        if overlaps {
            result.add_error(ConfigValidationError::PrefixCollision {
                cache: cache.clone(),
                rate_limit: rate_limit.clone(),
            });
        }
    }

    fn validate_observability(config: &crate::ObservabilityConfig, result: &mut ValidationResult) {
        let level = config.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            result.add_error(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }

        let format = config.log_format.to_lowercase();
        if !Self::VALID_LOG_FORMATS.contains(&format.as_str()) {
            result.add_error(ConfigValidationError::InvalidLogFormat {
                value: config.log_format.clone(),
            });
        }
    }
}
