//! Rate-limit policies and their per-action registry.

use quill_config::{ActionLimitConfig, FailurePolicy, LimitScope, RateLimitConfig};
use quill_core::{QuillError, QuillResult};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_MESSAGE: &str = "Rate limit exceeded";

/// Limit applied to one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Events admitted per window. Zero rejects every event.
    pub max_events: u32,
    /// Length of the sliding window.
    pub window: Duration,
    /// Identity the budget is charged to.
    pub scope: LimitScope,
    /// What to decide when the store cannot be reached.
    pub failure_policy: FailurePolicy,
    /// Message returned with rejections.
    pub message: Option<String>,
}

impl RateLimitPolicy {
    /// Creates a per-IP, fail-open policy.
    #[must_use]
    pub const fn new(max_events: u32, window: Duration) -> Self {
        Self {
            max_events,
            window,
            scope: LimitScope::Ip,
            failure_policy: FailurePolicy::Open,
            message: None,
        }
    }

    /// Login and registration: 5 attempts per 5 minutes per IP.
    #[must_use]
    pub fn auth() -> Self {
        let window = Duration::from_secs(300);
        Self::new(5, window).with_message(format!(
            "Too many authentication attempts. Please try again in {} minutes.",
            window.as_secs() / 60
        ))
    }

    /// General API access: 100 requests per hour per user.
    #[must_use]
    pub fn api() -> Self {
        Self::new(100, Duration::from_secs(3600))
            .with_scope(LimitScope::User)
            .with_message("API rate limit exceeded. Please try again later.")
    }

    /// Builds a policy from its configuration entry.
    #[must_use]
    pub fn from_config(config: &ActionLimitConfig) -> Self {
        Self {
            max_events: config.max_events,
            window: config.window(),
            scope: config.scope,
            failure_policy: config.failure_policy,
            message: config.message.clone(),
        }
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: LimitScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Sets the rejection message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Rejects windows shorter than one millisecond.
    pub fn validate(&self) -> QuillResult<()> {
        if self.window.as_millis() == 0 {
            return Err(QuillError::invalid_configuration(
                "rate limit window must be positive",
            ));
        }
        Ok(())
    }

    /// The message returned with rejections.
    #[must_use]
    pub fn rejection_message(&self) -> &str {
        self.message.as_deref().unwrap_or(DEFAULT_MESSAGE)
    }

    /// Builds the error describing a rejection under this policy.
    #[must_use]
    pub fn rejection(&self, retry_after: Duration) -> QuillError {
        QuillError::rate_limited(self.rejection_message(), retry_after)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(60))
    }
}

/// Policies by action name, with a fallback.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    default: RateLimitPolicy,
    actions: HashMap<String, RateLimitPolicy>,
}

impl PolicyRegistry {
    /// Creates a registry with only the fallback policy.
    #[must_use]
    pub fn new(default: RateLimitPolicy) -> Self {
        Self {
            default,
            actions: HashMap::new(),
        }
    }

    /// Builds the registry from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let actions = config
            .actions
            .iter()
            .map(|(action, limit)| (action.clone(), RateLimitPolicy::from_config(limit)))
            .collect();
        Self {
            default: RateLimitPolicy::from_config(&config.default),
            actions,
        }
    }

    /// Registers the policy for an action.
    #[must_use]
    pub fn with(mut self, action: impl Into<String>, policy: RateLimitPolicy) -> Self {
        self.actions.insert(action.into(), policy);
        self
    }

    /// Returns the policy for `action`, or the fallback.
    #[must_use]
    pub fn get(&self, action: &str) -> &RateLimitPolicy {
        self.actions.get(action).unwrap_or(&self.default)
    }

    /// The fallback policy.
    #[must_use]
    pub const fn default_policy(&self) -> &RateLimitPolicy {
        &self.default
    }
}
