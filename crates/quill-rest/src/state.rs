//! Application state for Axum handlers.

use quill_cache::CacheLayer;
use quill_ratelimit::RateLimiter;
use quill_store::SharedStore;
use std::sync::Arc;

/// Shared application state.
///
/// Built once at startup; every handler and middleware clones the handles.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheLayer>,
    pub limiter: Arc<RateLimiter>,
    pub store: SharedStore,
    /// When false the rate-limit middleware admits everything.
    pub rate_limit_enabled: bool,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(cache: Arc<CacheLayer>, limiter: Arc<RateLimiter>, store: SharedStore) -> Self {
        Self {
            cache,
            limiter,
            store,
            rate_limit_enabled: true,
        }
    }

    /// Turns the rate-limit middleware on or off.
    #[must_use]
    pub fn with_rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = enabled;
        self
    }
}
