//! The sliding-window rate limiter.

use crate::metrics::RateLimitMetrics;
use crate::{Decision, Identity, PolicyRegistry, RateLimitPolicy, RateLimitStatus};
use chrono::{DateTime, Utc};
use quill_config::{FailurePolicy, RateLimitConfig};
use quill_core::{ceil_secs, duration_millis, QuillError, QuillResult, SharedClock};
use quill_store::{SharedStore, WindowRequest};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sliding-window limiter backed by the shared store.
///
/// Windows live under `{key_prefix}:{identity}:{action}`. The store is the
/// only synchronization point, so limits hold across every process sharing
/// it.
#[derive(Clone)]
pub struct RateLimiter {
    store: SharedStore,
    clock: SharedClock,
    key_prefix: String,
    policies: PolicyRegistry,
}

impl RateLimiter {
    /// Creates a limiter with the fallback policy for every action.
    #[must_use]
    pub fn new(store: SharedStore, clock: SharedClock, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            key_prefix: key_prefix.into(),
            policies: PolicyRegistry::default(),
        }
    }

    /// Creates a limiter from configuration.
    #[must_use]
    pub fn from_config(store: SharedStore, clock: SharedClock, config: &RateLimitConfig) -> Self {
        Self::new(store, clock, config.key_prefix.clone())
            .with_policies(PolicyRegistry::from_config(config))
    }

    /// Replaces the per-action policies.
    #[must_use]
    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    /// The configured policy for `action`.
    #[must_use]
    pub fn policy(&self, action: &str) -> &RateLimitPolicy {
        self.policies.get(action)
    }

    /// The store key holding the window for `identity` and `action`.
    ///
    /// Actions never contain `:`, so the last segment is always the action
    /// even when the identity is an IPv6 address.
    #[must_use]
    pub fn window_key(&self, identity: &str, action: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, identity, action)
    }

    /// Checks an event against an explicit limit and records it if admitted.
    ///
    /// The failure policy comes from the policy registered for `action`.
    pub async fn check_and_record(
        &self,
        identity: &str,
        action: &str,
        max_events: u32,
        window: Duration,
    ) -> QuillResult<Decision> {
        let policy = RateLimitPolicy {
            max_events,
            window,
            ..self.policy(action).clone()
        };
        self.evaluate(identity, action, &policy).await
    }

    /// Checks an event against `policy` and records it if admitted.
    pub async fn check(
        &self,
        identity: &Identity,
        action: &str,
        policy: &RateLimitPolicy,
    ) -> QuillResult<Decision> {
        self.evaluate(identity.as_str(), action, policy).await
    }

    /// Checks an event against the policy registered for `action`.
    pub async fn check_action(&self, identity: &Identity, action: &str) -> QuillResult<Decision> {
        self.evaluate(identity.as_str(), action, self.policy(action))
            .await
    }

    /// Reads the window without recording anything.
    ///
    /// A store failure reports the full budget.
    pub async fn status(
        &self,
        identity: &str,
        action: &str,
        policy: &RateLimitPolicy,
    ) -> QuillResult<RateLimitStatus> {
        validate_call(identity, action, policy)?;

        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let window_ms = duration_millis(policy.window);
        let key = self.window_key(identity, action);

        let snapshot = match self.store.window_snapshot(&key, now_ms - window_ms).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = %key, error = %e, "rate limit status unavailable, reporting full budget");
                return Ok(RateLimitStatus {
                    limit: policy.max_events,
                    remaining: policy.max_events,
                    reset_at: now,
                    retry_after: None,
                });
            }
        };

        let count = u32::try_from(snapshot.count).unwrap_or(u32::MAX);
        let remaining = policy.max_events.saturating_sub(count);
        let reset_ms = snapshot.oldest_ms.map_or(now_ms, |oldest| oldest + window_ms);
        let retry_after = (remaining == 0).then(|| {
            let wait = if snapshot.oldest_ms.is_some() {
                millis_until(reset_ms, now_ms)
            } else {
                policy.window
            };
            ceil_secs(wait)
        });

        Ok(RateLimitStatus {
            limit: policy.max_events,
            remaining,
            reset_at: from_millis(reset_ms, now),
            retry_after,
        })
    }

    /// Drops the window for `identity` and `action`. Returns whether one existed.
    pub async fn clear(&self, identity: &str, action: &str) -> QuillResult<bool> {
        validate_target(identity, action)?;
        let key = self.window_key(identity, action);
        let existed = self.store.delete(&key).await?;
        debug!(key = %key, existed, "rate limit window cleared");
        Ok(existed)
    }

    async fn evaluate(
        &self,
        identity: &str,
        action: &str,
        policy: &RateLimitPolicy,
    ) -> QuillResult<Decision> {
        validate_call(identity, action, policy)?;

        if policy.max_events == 0 {
            RateLimitMetrics::rejected(action);
            return Ok(Decision::Rejected {
                retry_after: policy.window,
            });
        }

        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let window_ms = duration_millis(policy.window);
        let request = WindowRequest {
            key: self.window_key(identity, action),
            now_ms,
            window_ms,
            max_events: policy.max_events,
            member: format!("{}-{}", now_ms, Uuid::new_v4().simple()),
        };

        let outcome = match self.store.record_event(&request).await {
            Ok(outcome) => outcome,
            Err(e) => return Ok(Self::on_store_failure(&request, action, policy, now, &e)),
        };

        let oldest_ms = outcome.oldest_ms.unwrap_or(now_ms);
        if outcome.admitted {
            let used = u32::try_from(outcome.count).unwrap_or(u32::MAX);
            let remaining = policy.max_events.saturating_sub(used).saturating_sub(1);
            RateLimitMetrics::admitted(action);
            debug!(key = %request.key, remaining, "rate limit admitted");
            Ok(Decision::Admitted {
                remaining,
                reset_at: from_millis(oldest_ms + window_ms, now),
            })
        } else {
            let retry_after = millis_until(oldest_ms + window_ms, now_ms);
            RateLimitMetrics::rejected(action);
            debug!(
                key = %request.key,
                count = outcome.count,
                retry_after = ?retry_after,
                "rate limit rejected"
            );
            Ok(Decision::Rejected { retry_after })
        }
    }

    fn on_store_failure(
        request: &WindowRequest,
        action: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
        error: &QuillError,
    ) -> Decision {
        match policy.failure_policy {
            FailurePolicy::Open => {
                RateLimitMetrics::store_failure(action, "open");
                warn!(key = %request.key, error = %error, "rate limit store unavailable, admitting");
                Decision::Admitted {
                    remaining: policy.max_events.saturating_sub(1),
                    reset_at: from_millis(request.now_ms + request.window_ms, now),
                }
            }
            FailurePolicy::Closed => {
                RateLimitMetrics::store_failure(action, "closed");
                warn!(key = %request.key, error = %error, "rate limit store unavailable, rejecting");
                Decision::Rejected {
                    retry_after: policy.window,
                }
            }
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.store.backend_name())
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

fn validate_call(identity: &str, action: &str, policy: &RateLimitPolicy) -> QuillResult<()> {
    validate_target(identity, action)?;
    policy.validate()
}

fn validate_target(identity: &str, action: &str) -> QuillResult<()> {
    if identity.is_empty() {
        return Err(QuillError::invalid_configuration(
            "rate limit identity must not be empty",
        ));
    }
    if action.is_empty() {
        return Err(QuillError::invalid_configuration(
            "rate limit action must not be empty",
        ));
    }
    if action.contains(':') {
        return Err(QuillError::invalid_configuration(format!(
            "rate limit action '{}' must not contain ':'",
            action
        )));
    }
    Ok(())
}

fn millis_until(target_ms: i64, now_ms: i64) -> Duration {
    let wait = u64::try_from(target_ms - now_ms).unwrap_or(0).max(1);
    Duration::from_millis(wait)
}

fn from_millis(ms: i64, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ManualClock;
    use quill_store::MemoryStore;
    use std::sync::Arc;

    fn limiter() -> (Arc<ManualClock>, Arc<MemoryStore>, RateLimiter) {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let limiter = RateLimiter::new(store.clone(), clock.clone(), "quill:rl");
        (clock, store, limiter)
    }

    #[tokio::test]
    async fn test_window_key() {
        let (_, _, limiter) = limiter();
        assert_eq!(
            limiter.window_key("ip:1.2.3.4", "login"),
            "quill:rl:ip:1.2.3.4:login"
        );
    }

    #[tokio::test]
    async fn test_window_keys_do_not_collide() {
        let (_, store, limiter) = limiter();
        let window = Duration::from_secs(60);

        let decision = limiter.check_and_record("a:b", "c", 1, window).await.unwrap();
        assert!(decision.is_admitted());
        let colliding = limiter.check_and_record("a", "b:c", 1, window).await;
        assert!(matches!(colliding, Err(QuillError::InvalidConfiguration(_))));
        assert!(matches!(
            limiter.clear("a", "b:c").await,
            Err(QuillError::InvalidConfiguration(_))
        ));

        let ipv6 = Identity::ip("2001:db8::1");
        assert!(limiter.check_action(&ipv6, "login").await.unwrap().is_admitted());
        assert_eq!(
            store.keys(),
            vec![
                "quill:rl:a:b:c".to_string(),
                "quill:rl:ip:2001:db8::1:login".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_boundary_exactness() {
        let (clock, _, limiter) = limiter();
        let window = Duration::from_secs(10);

        for expected in [2, 1, 0] {
            let decision = limiter
                .check_and_record("ip:1.2.3.4", "comment", 3, window)
                .await
                .unwrap();
            assert_eq!(decision.remaining(), expected);
            assert!(decision.is_admitted());
        }
        let fourth = limiter
            .check_and_record("ip:1.2.3.4", "comment", 3, window)
            .await
            .unwrap();
        assert_eq!(
            fourth,
            Decision::Rejected {
                retry_after: Duration::from_secs(10)
            }
        );

        // The first event is exactly one window old and no longer counts.
        clock.advance(window);
        let decision = limiter
            .check_and_record("ip:1.2.3.4", "comment", 3, window)
            .await
            .unwrap();
        assert!(decision.is_admitted());
    }

    #[tokio::test]
    async fn test_zero_max_events_always_rejects() {
        let (_, store, limiter) = limiter();
        let decision = limiter
            .check_and_record("ip:1.2.3.4", "blocked", 0, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(decision.retry_after_secs(), Some(30));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (_, _, limiter) = limiter();
        for (identity, action, window) in [
            ("ip:1.2.3.4", "login", Duration::ZERO),
            ("", "login", Duration::from_secs(1)),
            ("ip:1.2.3.4", "", Duration::from_secs(1)),
            ("ip:1.2.3.4", "posts:create", Duration::from_secs(1)),
        ] {
            let result = limiter.check_and_record(identity, action, 5, window).await;
            assert!(matches!(result, Err(QuillError::InvalidConfiguration(_))));
        }
    }

    #[tokio::test]
    async fn test_fail_open_and_closed() {
        let (_, store, limiter) = limiter();
        store.set_available(false);

        let open = limiter
            .check_and_record("ip:1.2.3.4", "login", 5, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(open.remaining(), 4);

        let closed = RateLimitPolicy::new(5, Duration::from_secs(60))
            .with_failure_policy(FailurePolicy::Closed);
        let decision = limiter
            .check(&Identity::ip("1.2.3.4"), "login", &closed)
            .await
            .unwrap();
        assert_eq!(decision.retry_after_secs(), Some(60));
    }

    #[tokio::test]
    async fn test_registered_policy_selects_failure_mode() {
        let (_, store, limiter) = limiter();
        let limiter = limiter.with_policies(PolicyRegistry::default().with(
            "payment",
            RateLimitPolicy::new(3, Duration::from_secs(60))
                .with_failure_policy(FailurePolicy::Closed),
        ));
        store.set_available(false);

        let decision = limiter
            .check_and_record("user:7", "payment", 3, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!decision.is_admitted());

        let decision = limiter
            .check_action(&Identity::user(7), "comment")
            .await
            .unwrap();
        assert!(decision.is_admitted());
    }

    #[tokio::test]
    async fn test_status_does_not_consume() {
        let (clock, _, limiter) = limiter();
        let policy = RateLimitPolicy::new(2, Duration::from_secs(60));
        let identity = Identity::ip("1.2.3.4");

        let status = limiter.status("ip:1.2.3.4", "login", &policy).await.unwrap();
        assert_eq!(status.remaining, 2);
        assert_eq!(status.retry_after, None);

        limiter.check(&identity, "login", &policy).await.unwrap();
        clock.advance(Duration::from_secs(20));
        limiter.check(&identity, "login", &policy).await.unwrap();

        let status = limiter.status("ip:1.2.3.4", "login", &policy).await.unwrap();
        assert_eq!(status.limit, 2);
        assert_eq!(status.remaining, 0);
        assert_eq!(status.retry_after, Some(40));

        let again = limiter.status("ip:1.2.3.4", "login", &policy).await.unwrap();
        assert_eq!(again, status);
    }

    #[tokio::test]
    async fn test_status_fails_open() {
        let (_, store, limiter) = limiter();
        store.set_available(false);
        let status = limiter
            .status("ip:1.2.3.4", "login", &RateLimitPolicy::auth())
            .await
            .unwrap();
        assert_eq!(status.remaining, 5);
    }

    #[tokio::test]
    async fn test_clear() {
        let (_, _, limiter) = limiter();
        let policy = RateLimitPolicy::new(1, Duration::from_secs(60));
        let identity = Identity::ip("1.2.3.4");

        assert!(limiter.check(&identity, "login", &policy).await.unwrap().is_admitted());
        assert!(!limiter.check(&identity, "login", &policy).await.unwrap().is_admitted());

        assert!(limiter.clear("ip:1.2.3.4", "login").await.unwrap());
        assert!(!limiter.clear("ip:1.2.3.4", "login").await.unwrap());
        assert!(limiter.check(&identity, "login", &policy).await.unwrap().is_admitted());
    }
}
