//! Prometheus metrics for the cache layer.

use metrics::{counter, describe_counter};

/// Metric names for the cache layer.
pub mod names {
    /// Lookups served from the store.
    pub const CACHE_HITS_TOTAL: &str = "quill_cache_hits_total";
    /// Lookups that had to compute.
    pub const CACHE_MISSES_TOTAL: &str = "quill_cache_misses_total";
    /// Store calls that failed and were absorbed.
    pub const CACHE_STORE_FAILURES_TOTAL: &str = "quill_cache_store_failures_total";
    /// Keys removed by invalidation.
    pub const CACHE_INVALIDATED_KEYS_TOTAL: &str = "quill_cache_invalidated_keys_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Total number of cache hits");
    describe_counter!(names::CACHE_MISSES_TOTAL, "Total number of cache misses");
    describe_counter!(
        names::CACHE_STORE_FAILURES_TOTAL,
        "Total number of cache store failures absorbed by fail-open reads and writes"
    );
    describe_counter!(
        names::CACHE_INVALIDATED_KEYS_TOTAL,
        "Total number of cache keys removed by invalidation"
    );
}

/// Cache metrics recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a hit.
    pub fn hit(namespace: &str) {
        counter!(names::CACHE_HITS_TOTAL, "namespace" => namespace.to_string()).increment(1);
    }

    /// Record a miss.
    pub fn miss(namespace: &str) {
        counter!(names::CACHE_MISSES_TOTAL, "namespace" => namespace.to_string()).increment(1);
    }

    /// Record an absorbed store failure.
    pub fn store_failure(namespace: &str, operation: &'static str) {
        counter!(
            names::CACHE_STORE_FAILURES_TOTAL,
            "namespace" => namespace.to_string(),
            "operation" => operation
        )
        .increment(1);
    }

    /// Record keys removed by invalidation.
    pub fn invalidated(namespace: &str, keys: u64) {
        counter!(names::CACHE_INVALIDATED_KEYS_TOTAL, "namespace" => namespace.to_string()).increment(keys);
    }
}
