//! Page cache middleware.

use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use quill_cache::{keys, CacheLayer, CachedResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Response header reporting whether a page came from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Largest body cached unless overridden with [`PageCache::with_max_body_bytes`].
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Middleware state for caching whole `GET` responses.
#[derive(Clone)]
pub struct PageCache {
    cache: Arc<CacheLayer>,
    prefix: Arc<str>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl PageCache {
    /// Caches pages under `{prefix}:{path}:{sorted query}` for `timeout`.
    pub fn new(cache: Arc<CacheLayer>, prefix: &str, timeout: Duration) -> Self {
        Self {
            cache,
            prefix: Arc::from(prefix),
            timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Responses larger than this, or of unknown length, pass through
    /// uncached.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Wraps every route of `router` with this cache.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, page_cache_middleware))
    }

    /// The cache key for a request URI.
    #[must_use]
    pub fn key_for(&self, uri: &Uri) -> String {
        let args: Vec<(String, String)> = uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        let args: Vec<(&str, &str)> = args
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        keys::page(&self.prefix, uri.path(), &args)
    }
}

/// Serves `GET` requests from the cache and stores successful responses.
///
/// Cache failures never fail the request: the handler runs as if the
/// cache were empty.
pub async fn page_cache_middleware(
    State(page): State<PageCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET || !page.cache.is_enabled() {
        return next.run(request).await;
    }

    let key = page.key_for(request.uri());
    match page.cache.get::<CachedResponse>(&key).await {
        Ok(Some(cached)) => return replay(cached),
        Ok(None) => {}
        Err(e) => warn!(key = %key, error = %e, "Page cache read failed"),
    }

    let response = next.run(request).await;
    if !CachedResponse::is_cacheable(response.status().as_u16()) {
        return response;
    }

    let limit = u64::try_from(page.max_body_bytes).unwrap_or(u64::MAX);
    let fits = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= limit);
    if !fits {
        debug!(key = %key, "Response too large or unbounded, not cached");
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, page.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    if let Some(cached) = CachedResponse::capture(parts.status.as_u16(), headers, &bytes) {
        if let Err(e) = page.cache.set(&key, &cached, page.timeout).await {
            warn!(key = %key, error = %e, "Page cache write failed");
        }
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    response
}

fn replay(cached: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);

    let headers = response.headers_mut();
    for (name, value) in &cached.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ManualClock;
    use quill_store::MemoryStore;

    #[test]
    fn test_key_sorts_query() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = Arc::new(CacheLayer::new(store, clock, "quill:cache"));
        let page = PageCache::new(cache, "page", Duration::from_secs(60));

        let a: Uri = "/posts?page=2&category=rust".parse().unwrap();
        let b: Uri = "/posts?category=rust&page=2".parse().unwrap();
        assert_eq!(page.key_for(&a), page.key_for(&b));
        assert_eq!(page.key_for(&a), "page:/posts:category=rust&page=2");
        assert_eq!(page.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }
}
