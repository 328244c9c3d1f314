//! In-process cache counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a [`crate::CacheLayer`] since it was built.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    store_failures: AtomicU64,
    invalidated_keys: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidated(&self, keys: u64) {
        self.invalidated_keys.fetch_add(keys, Ordering::Relaxed);
    }

    /// Copies the counters.
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStatsSnapshot {
            hits,
            misses,
            store_failures: self.store_failures.load(Ordering::Relaxed),
            invalidated_keys: self.invalidated_keys.load(Ordering::Relaxed),
            hit_rate: hit_rate(hits, misses),
        }
    }
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Lookups served from the store.
    pub hits: u64,
    /// Lookups that computed.
    pub misses: u64,
    /// Store failures absorbed.
    pub store_failures: u64,
    /// Keys removed by invalidation.
    pub invalidated_keys: u64,
    /// Hit percentage, rounded to two decimals.
    pub hit_rate: f64,
}

/// Hit percentage rounded to two decimals, zero when nothing was looked up.
#[must_use]
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    let rate = hits as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(hit_rate(0, 0), 0.0);
        assert_eq!(hit_rate(1, 0), 100.0);
        assert_eq!(hit_rate(1, 2), 33.33);
        assert_eq!(hit_rate(2, 1), 66.67);
    }

    #[test]
    fn test_snapshot() {
        let stats = CacheStats::default();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_store_failure();
        stats.record_invalidated(4);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.store_failures, 1);
        assert_eq!(snapshot.invalidated_keys, 4);
        assert_eq!(snapshot.hit_rate, 75.0);
    }
}
