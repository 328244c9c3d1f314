//! Read-through cache facade over the shared store.

use crate::metrics::CacheMetrics;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::InvalidationRequest;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use quill_config::CacheConfig;
use quill_core::{QuillError, QuillResult, SharedClock};
use quill_store::{pattern, SharedStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Envelope written to the store around every cached value.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    value: T,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Cache facade.
///
/// Holds no values itself: entries live in the store under
/// `{namespace}:{key}` and expire with the store TTL. Reads also compare the
/// entry's own expiry against the clock, so a value is never returned after
/// its timeout even if the store has not evicted it yet.
#[derive(Clone)]
pub struct CacheLayer {
    store: SharedStore,
    clock: SharedClock,
    namespace: String,
    enabled: bool,
    config: Arc<CacheConfig>,
    stats: Arc<CacheStats>,
}

impl CacheLayer {
    /// Creates an enabled cache writing under `namespace`.
    #[must_use]
    pub fn new(store: SharedStore, clock: SharedClock, namespace: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            namespace: namespace.into(),
            enabled: true,
            config: Arc::new(CacheConfig::default()),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Creates a cache from configuration.
    #[must_use]
    pub fn from_config(store: SharedStore, clock: SharedClock, config: &CacheConfig) -> Self {
        let mut layer = Self::new(store, clock, config.key_prefix.clone()).with_enabled(config.enabled);
        layer.config = Arc::new(config.clone());
        layer
    }

    /// The configured timeout for a named operation, such as `trending_posts`.
    #[must_use]
    pub fn timeout_for(&self, operation: &str) -> Duration {
        self.config.timeout_for(operation)
    }

    /// Turns caching on or off. A disabled cache always computes.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether lookups consult the store.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The key namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the store backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn full_pattern(&self, pattern: &str) -> String {
        format!("{}:{}", pattern::escape(&self.namespace), pattern)
    }

    fn validate_timeout(key: &str, timeout: Duration) -> QuillResult<()> {
        if timeout.as_millis() == 0 {
            return Err(QuillError::invalid_configuration(format!(
                "cache timeout for '{}' must be positive",
                key
            )));
        }
        Ok(())
    }

    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> QuillResult<Option<T>> {
        let Some(raw) = self.store.get(&self.full_key(key)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) if entry.expires_at > self.clock.now() => Ok(Some(entry.value)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    async fn write_entry<T: Serialize>(&self, key: &str, value: &T, timeout: Duration) -> QuillResult<()> {
        let created_at = self.clock.now();
        let expires_at = ChronoDuration::from_std(timeout)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry {
            value,
            created_at,
            expires_at,
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set(&self.full_key(key), &raw, timeout).await
    }

    /// Returns the cached value for `key`, if present and fresh.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> QuillResult<Option<T>> {
        if !self.enabled {
            return Ok(None);
        }
        let value = self.read_entry(key).await?;
        match &value {
            Some(_) => debug!(key = %key, "Cache hit"),
            None => debug!(key = %key, "Cache miss"),
        }
        Ok(value)
    }

    /// Stores `value` under `key` for `timeout`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, timeout: Duration) -> QuillResult<()> {
        Self::validate_timeout(key, timeout)?;
        if !self.enabled {
            return Ok(());
        }
        self.write_entry(key, value, timeout).await?;
        debug!(key = %key, timeout_secs = timeout.as_secs(), "Cached value");
        Ok(())
    }

    /// Removes `key`. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> QuillResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        self.store.delete(&self.full_key(key)).await
    }

    /// Returns the cached value or computes, stores and returns a fresh one.
    ///
    /// An error from `compute` is returned unchanged and nothing is stored.
    /// Store failures are absorbed: a failed read counts as a miss and a
    /// failed write only logs a warning.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, timeout: Duration, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<QuillError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Self::validate_timeout(key, timeout)?;
        if !self.enabled {
            return compute().await;
        }

        match self.read_entry::<T>(key).await {
            Ok(Some(value)) => {
                debug!(key = %key, "Cache hit");
                self.stats.record_hit();
                CacheMetrics::hit(&self.namespace);
                return Ok(value);
            }
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, computing without cache");
                self.stats.record_store_failure();
                CacheMetrics::store_failure(&self.namespace, "read");
            }
        }
        self.stats.record_miss();
        CacheMetrics::miss(&self.namespace);

        let value = compute().await?;

        if let Err(e) = self.write_entry(key, &value, timeout).await {
            warn!(key = %key, error = %e, "Cache write failed, returning uncached value");
            self.stats.record_store_failure();
            CacheMetrics::store_failure(&self.namespace, "write");
        }

        Ok(value)
    }

    /// Removes every key matching any of `patterns`.
    ///
    /// Literal keys are deleted directly, glob patterns by scanning. Returns
    /// the number of keys removed; invalidating absent keys is not an error.
    pub async fn invalidate<I, S>(&self, patterns: I) -> QuillResult<u64>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.enabled {
            return Ok(0);
        }

        let mut removed = 0u64;
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern::is_pattern(pattern) {
                removed += self.store.delete_pattern(&self.full_pattern(pattern)).await?;
            } else if self.store.delete(&self.full_key(&pattern::unescape(pattern))).await? {
                removed += 1;
            }
        }

        self.stats.record_invalidated(removed);
        CacheMetrics::invalidated(&self.namespace, removed);
        Ok(removed)
    }

    /// Applies an invalidation request from a committed write.
    pub async fn apply(&self, request: &InvalidationRequest) -> QuillResult<u64> {
        let removed = self.invalidate(&request.patterns).await?;
        info!(
            issued_by = %request.issued_by,
            patterns = request.patterns.len(),
            removed,
            "Cache invalidated"
        );
        Ok(removed)
    }

    /// Removes every entry in the cache namespace.
    pub async fn clear_all(&self) -> QuillResult<u64> {
        let removed = self.invalidate(["*"]).await?;
        info!(namespace = %self.namespace, removed, "Cache cleared");
        Ok(removed)
    }

    /// Stores a batch of precomputed values. Returns how many were stored.
    ///
    /// Individual failures are logged and skipped.
    pub async fn warm<T, I, K>(&self, entries: I, timeout: Duration) -> QuillResult<usize>
    where
        T: Serialize,
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
    {
        Self::validate_timeout("warm", timeout)?;
        if !self.enabled {
            return Ok(0);
        }

        let mut stored = 0usize;
        for (key, value) in entries {
            let key = key.as_ref();
            match self.write_entry(key, &value, timeout).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache warm-up write failed");
                    self.stats.record_store_failure();
                    CacheMetrics::store_failure(&self.namespace, "warm");
                }
            }
        }

        info!(stored, "Cache warmed");
        Ok(stored)
    }

    /// Counters since this layer was built.
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ManualClock;
    use quill_store::{KeyValueStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn layer() -> (Arc<ManualClock>, Arc<MemoryStore>, CacheLayer) {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = CacheLayer::new(store.clone(), clock.clone(), "quill:cache");
        (clock, store, cache)
    }

    #[test]
    fn test_operation_timeouts_from_config() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let mut config = CacheConfig::default();
        config.timeouts.insert("trending_posts".to_string(), 120);
        let cache = CacheLayer::from_config(store, clock, &config);

        assert_eq!(cache.timeout_for("trending_posts"), Duration::from_secs(120));
        assert_eq!(cache.timeout_for("user_profile"), Duration::from_secs(900));
        assert_eq!(cache.timeout_for("unknown"), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_keys_are_namespaced() {
        let (_, store, cache) = layer();
        cache.set("user:42", &"alice", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.keys(), vec!["quill:cache:user:42".to_string()]);
        assert_eq!(cache.get::<String>("user:42").await.unwrap(), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_rejected() {
        let (_, _, cache) = layer();
        let err = cache.set("k", &1, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, QuillError::InvalidConfiguration(_)));

        let calls = AtomicUsize::new(0);
        let result: QuillResult<u32> = cache
            .get_or_compute("k", Duration::ZERO, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            })
            .await;
        assert!(matches!(result, Err(QuillError::InvalidConfiguration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_entry_expiry_checked_on_read() {
        let (clock, store, cache) = layer();
        cache.set("post:1", &"body", Duration::from_secs(10)).await.unwrap();

        // rewrite the raw entry with a longer store TTL but the same envelope
        let raw = store.get("quill:cache:post:1").await.unwrap().unwrap();
        store.set("quill:cache:post:1", &raw, Duration::from_secs(3_600)).await.unwrap();

        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.get::<String>("post:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let (_, store, cache) = layer();
        store.set("quill:cache:user:1", "not json", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<String>("user:1").await.unwrap(), None);

        let value: QuillResult<String> = cache
            .get_or_compute("user:1", Duration::from_secs(60), || async { Ok("fresh".to_string()) })
            .await;
        assert_eq!(value.unwrap(), "fresh");
        assert_eq!(cache.get::<String>("user:1").await.unwrap(), Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_primitives_propagate_store_failures() {
        let (_, store, cache) = layer();
        store.set_available(false);

        assert!(cache.get::<String>("k").await.unwrap_err().is_store_failure());
        assert!(cache.set("k", &1, Duration::from_secs(1)).await.unwrap_err().is_store_failure());
        assert!(cache.delete("k").await.unwrap_err().is_store_failure());
        assert!(cache.invalidate(["posts:*"]).await.unwrap_err().is_store_failure());
    }

    #[tokio::test]
    async fn test_invalidate_literal_and_pattern() {
        let (_, store, cache) = layer();
        for key in ["posts:page:1", "posts:page:2", "user:42", "trending:posts:limit:10"] {
            cache.set(key, &key, Duration::from_secs(60)).await.unwrap();
        }

        assert_eq!(cache.invalidate(["posts:*", "trending:posts:limit:10"]).await.unwrap(), 3);
        assert_eq!(store.keys(), vec!["quill:cache:user:42".to_string()]);

        // idempotent
        assert_eq!(cache.invalidate(["posts:*", "trending:posts:limit:10"]).await.unwrap(), 0);
        assert_eq!(cache.stats().invalidated_keys, 3);
    }

    #[tokio::test]
    async fn test_invalidate_does_not_touch_other_namespaces() {
        let (_, store, cache) = layer();
        store.set("quill:rl:ip:1.2.3.4:login", "x", Duration::from_secs(60)).await.unwrap();
        cache.set("posts:page:1", &1, Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.clear_all().await.unwrap(), 1);
        assert_eq!(store.keys(), vec!["quill:rl:ip:1.2.3.4:login".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_computes() {
        let (_, store, cache) = layer();
        let cache = cache.with_enabled(false);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: QuillResult<u32> = cache
                .get_or_compute("k", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value.unwrap(), 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
        assert_eq!(cache.invalidate(["*"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_warm_and_stats() {
        let (_, _, cache) = layer();
        let stored = cache
            .warm(
                vec![("trending:posts:limit:10", vec![1, 2, 3]), ("trending:posts:limit:5", vec![1])],
                Duration::from_secs(600),
            )
            .await
            .unwrap();
        assert_eq!(stored, 2);

        let value: QuillResult<Vec<u32>> = cache
            .get_or_compute("trending:posts:limit:10", Duration::from_secs(600), || async {
                Ok(Vec::new())
            })
            .await;
        assert_eq!(value.unwrap(), vec![1, 2, 3]);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate, 100.0);
    }

    #[tokio::test]
    async fn test_warm_skips_failures() {
        let (_, store, cache) = layer();
        store.set_available(false);
        let stored = cache.warm([("a", 1), ("b", 2)], Duration::from_secs(60)).await.unwrap();
        assert_eq!(stored, 0);
        assert_eq!(cache.stats().store_failures, 2);
    }
}
