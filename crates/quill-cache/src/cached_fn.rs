//! Function result caching.

use crate::{CacheKeyGenerator, CacheLayer};
use quill_core::{QuillError, QuillResult};
use quill_store::pattern;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// A computation whose results are cached by argument value.
///
/// Each call hashes its arguments with [`CacheKeyGenerator::for_call`] under
/// the wrapper's name and goes through [`CacheLayer::get_or_compute`].
pub struct CachedFn<F> {
    cache: CacheLayer,
    name: String,
    timeout: Duration,
    func: F,
}

impl<F> CachedFn<F> {
    /// Wraps `func`. `name` identifies the function in cache keys.
    #[must_use]
    pub fn new(cache: CacheLayer, name: impl Into<String>, timeout: Duration, func: F) -> Self {
        Self {
            cache,
            name: name.into(),
            timeout,
            func,
        }
    }

    /// Wraps `func` with the timeout configured for the operation `name`.
    #[must_use]
    pub fn for_operation(cache: CacheLayer, name: impl Into<String>, func: F) -> Self {
        let name = name.into();
        let timeout = cache.timeout_for(&name);
        Self::new(cache, name, timeout, func)
    }

    /// The name used in cache keys.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls through the cache.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        A: Serialize,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
        E: From<QuillError>,
    {
        let key = CacheKeyGenerator::for_call(&self.name, &args, &())?;
        self.cache
            .get_or_compute(&key, self.timeout, || (self.func)(args))
            .await
    }

    /// Drops every cached result of this function.
    pub async fn invalidate_all(&self) -> QuillResult<u64> {
        let pattern = format!("call:{}:*", pattern::escape(&self.name));
        self.cache.invalidate([pattern]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_config::CacheConfig;
    use quill_core::ManualClock;
    use quill_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_results_cached_per_argument() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = CacheLayer::new(store, clock, "quill:cache");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let square = CachedFn::new(cache, "square", Duration::from_secs(60), move |n: u64| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, QuillError>(n * n)
            }
        });

        assert_eq!(square.call(3).await.unwrap(), 9);
        assert_eq!(square.call(3).await.unwrap(), 9);
        assert_eq!(square.call(4).await.unwrap(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert_eq!(square.invalidate_all().await.unwrap(), 2);
        assert_eq!(square.call(3).await.unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_operation_timeout_applies() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = CacheLayer::from_config(store, clock.clone(), &CacheConfig::default());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let trending = CachedFn::for_operation(cache, "trending_posts", move |limit: u32| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, QuillError>(vec![limit; 2])
            }
        });

        trending.call(10).await.unwrap();
        clock.advance(Duration::from_secs(599));
        trending.call(10).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(2));
        trending.call(10).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
