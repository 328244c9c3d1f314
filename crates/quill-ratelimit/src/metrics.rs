//! Prometheus metrics for rate limiting.

use metrics::{counter, describe_counter};

/// Metric names for rate limiting.
pub mod names {
    /// Events admitted.
    pub const RATE_LIMIT_ADMITTED_TOTAL: &str = "quill_rate_limit_admitted_total";
    /// Events rejected.
    pub const RATE_LIMIT_REJECTED_TOTAL: &str = "quill_rate_limit_rejected_total";
    /// Checks decided by the failure policy because the store was unavailable.
    pub const RATE_LIMIT_STORE_FAILURES_TOTAL: &str = "quill_rate_limit_store_failures_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::RATE_LIMIT_ADMITTED_TOTAL,
        "Total number of events admitted by the rate limiter"
    );
    describe_counter!(
        names::RATE_LIMIT_REJECTED_TOTAL,
        "Total number of events rejected by the rate limiter"
    );
    describe_counter!(
        names::RATE_LIMIT_STORE_FAILURES_TOTAL,
        "Total number of rate-limit checks decided by the failure policy"
    );
}

/// Rate limiter metrics recorder.
#[derive(Clone)]
pub struct RateLimitMetrics;

impl RateLimitMetrics {
    /// Record an admitted event.
    pub fn admitted(action: &str) {
        counter!(names::RATE_LIMIT_ADMITTED_TOTAL, "action" => action.to_string()).increment(1);
    }

    /// Record a rejected event.
    pub fn rejected(action: &str) {
        counter!(names::RATE_LIMIT_REJECTED_TOTAL, "action" => action.to_string()).increment(1);
    }

    /// Record a check the store could not answer.
    pub fn store_failure(action: &str, policy: &'static str) {
        counter!(
            names::RATE_LIMIT_STORE_FAILURES_TOTAL,
            "action" => action.to_string(),
            "policy" => policy
        )
        .increment(1);
    }
}
