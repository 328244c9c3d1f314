//! Application configuration structures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Response and function cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Request throttling configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "quill".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// Peer addresses allowed to set `X-Forwarded-For` and `X-Real-IP`.
    /// Forwarding headers from any other peer are ignored.
    pub trusted_proxies: Vec<String>,
    /// Bearer token granting access to the admin endpoints. Without it only
    /// an authentication layer in front of Quill can grant admin access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_enabled: true,
            trusted_proxies: Vec::new(),
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed trusted proxy addresses. Entries that do not parse are skipped;
    /// the validator reports them.
    #[must_use]
    pub fn trusted_proxy_addrs(&self) -> Vec<IpAddr> {
        self.trusted_proxies
            .iter()
            .filter_map(|addr| addr.trim().parse().ok())
            .collect()
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// Enable Redis. When disabled the server runs on an in-process store.
    pub enabled: bool,
    /// Upper bound on any single store call, in milliseconds.
    pub operation_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            enabled: true,
            operation_timeout_ms: 250,
        }
    }
}

impl RedisConfig {
    /// Returns the per-call timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching. When disabled every lookup computes.
    pub enabled: bool,
    /// Namespace prepended to every cache key.
    pub key_prefix: String,
    /// Timeout applied when an operation has no entry in `timeouts`.
    pub default_timeout_secs: u64,
    /// Per-operation timeouts in seconds.
    pub timeouts: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let timeouts = [
            ("trending_posts", 600),
            ("popular_posts", 300),
            ("posts_list", 300),
            ("post", 600),
            ("user_profile", 900),
            ("post_comments", 300),
            ("search_results", 300),
        ]
        .into_iter()
        .map(|(name, secs)| (name.to_string(), secs))
        .collect();

        Self {
            enabled: true,
            key_prefix: "quill:cache".to_string(),
            default_timeout_secs: 300,
            timeouts,
        }
    }
}

impl CacheConfig {
    /// Returns the default timeout as a Duration.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Returns the timeout configured for `operation`, falling back to the default.
    #[must_use]
    pub fn timeout_for(&self, operation: &str) -> Duration {
        self.timeouts
            .get(operation)
            .map_or_else(|| self.default_timeout(), |secs| Duration::from_secs(*secs))
    }
}

/// Whose budget a request is charged to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    /// Charged to the client address.
    #[default]
    Ip,
    /// Charged to the authenticated user, or the address for anonymous callers.
    User,
}

/// What the limiter does when the store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit the request and log a warning.
    #[default]
    Open,
    /// Reject the request for one full window.
    Closed,
}

/// Limits for a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimitConfig {
    /// Events admitted per window. Zero blocks the action.
    pub max_events: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Identity the budget is charged to.
    #[serde(default)]
    pub scope: LimitScope,
    /// Behaviour on store outage.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Message returned with rejections.
    #[serde(default)]
    pub message: Option<String>,
}

impl ActionLimitConfig {
    /// Returns the window as a Duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for ActionLimitConfig {
    fn default() -> Self {
        Self {
            max_events: 60,
            window_secs: 60,
            scope: LimitScope::Ip,
            failure_policy: FailurePolicy::Open,
            message: None,
        }
    }
}

/// Rate-limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable throttling. When disabled the middleware admits everything.
    pub enabled: bool,
    /// Namespace prepended to every window key.
    pub key_prefix: String,
    /// Policy for actions without an entry in `actions`.
    pub default: ActionLimitConfig,
    /// Per-action policies.
    pub actions: BTreeMap<String, ActionLimitConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let auth = ActionLimitConfig {
            max_events: 5,
            window_secs: 300,
            scope: LimitScope::Ip,
            failure_policy: FailurePolicy::Open,
            message: Some("Too many authentication attempts. Please try again in 5 minutes.".to_string()),
        };
        let api = ActionLimitConfig {
            max_events: 100,
            window_secs: 3600,
            scope: LimitScope::User,
            failure_policy: FailurePolicy::Open,
            message: Some("API rate limit exceeded. Please try again later.".to_string()),
        };

        let mut actions = BTreeMap::new();
        actions.insert("login".to_string(), auth.clone());
        actions.insert("register".to_string(), auth);
        actions.insert("api".to_string(), api);

        Self {
            enabled: true,
            key_prefix: "quill:rl".to_string(),
            default: ActionLimitConfig::default(),
            actions,
        }
    }
}

impl RateLimitConfig {
    /// Returns the limits for `action`, falling back to the default policy.
    #[must_use]
    pub fn action(&self, action: &str) -> &ActionLimitConfig {
        self.actions.get(action).unwrap_or(&self.default)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: String,
    /// Enable Prometheus metrics.
    pub metrics_enabled: bool,
    /// Metrics endpoint path.
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}
