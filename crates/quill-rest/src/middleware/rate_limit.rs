//! Rate-limit middleware.

use super::AuthenticatedUser;
use crate::responses::AppError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use quill_core::QuillError;
use quill_ratelimit::{Decision, Identity, RateLimitPolicy, RateLimiter};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Client address used when the peer address is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

/// Body of a `429 Too Many Requests` response.
#[derive(Debug, Serialize)]
pub struct RateLimitRejection {
    pub error: String,
    pub retry_after: u64,
}

/// Peers allowed to report the client address in forwarding headers.
#[derive(Debug, Clone)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(addrs.into_iter().collect())
    }

    #[must_use]
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.0.contains(addr)
    }
}

impl Default for TrustedProxies {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

/// Middleware state: the limiter plus the action and policy of one route.
#[derive(Clone)]
pub struct RouteRateLimit {
    limiter: Arc<RateLimiter>,
    action: Arc<str>,
    policy: Arc<RateLimitPolicy>,
    proxies: TrustedProxies,
    enabled: bool,
}

impl RouteRateLimit {
    /// Limits a route under `action` with the limiter's registered policy.
    pub fn new(limiter: Arc<RateLimiter>, action: &str) -> Self {
        let policy = Arc::new(limiter.policy(action).clone());
        Self {
            limiter,
            action: Arc::from(action),
            policy,
            proxies: TrustedProxies::default(),
            enabled: true,
        }
    }

    /// Overrides the policy for this route.
    #[must_use]
    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Believes forwarding headers from these peers.
    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: TrustedProxies) -> Self {
        self.proxies = proxies;
        self
    }

    /// When disabled every request is admitted without touching the store.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Wraps every route of `router` with this limit.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, rate_limit_middleware))
    }
}

/// Rate-limit middleware.
///
/// Charges the request to the caller's identity under the route's action.
/// Admitted requests get `X-RateLimit-*` headers; rejected ones a `429`
/// with `Retry-After`.
pub async fn rate_limit_middleware(
    State(route): State<RouteRateLimit>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !route.enabled {
        return next.run(request).await;
    }

    let addr = client_ip(&request, &route.proxies);
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.0.as_str());
    let identity = Identity::resolve(route.policy.scope, &addr, user);

    match route.limiter.check(&identity, &route.action, &route.policy).await {
        Ok(Decision::Admitted {
            remaining,
            reset_at,
        }) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(route.policy.max_events));
            headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
            headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(reset_at.timestamp()));
            response
        }
        Ok(Decision::Rejected { retry_after }) => {
            let error = route.policy.rejection(retry_after);
            debug!(identity = %identity, action = %route.action, retry_after = ?retry_after, "Request throttled");
            rejection(&error, route.policy.max_events)
        }
        Err(e) => {
            error!(action = %route.action, error = %e, "Rate limit check failed");
            AppError(e).into_response()
        }
    }
}

fn rejection(error: &QuillError, limit: u32) -> Response {
    let retry_after = error.retry_after_secs().unwrap_or(1);
    let body = RateLimitRejection {
        error: error.to_string(),
        retry_after,
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
    response
}

/// The caller's address.
///
/// The peer address, unless the peer is a trusted proxy: then the first
/// `X-Forwarded-For` hop, else `X-Real-IP`, else the proxy itself.
pub fn client_ip(request: &Request<Body>, proxies: &TrustedProxies) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match peer {
        Some(peer) if proxies.contains(&peer) => {
            forwarded_ip(request.headers()).unwrap_or_else(|| peer.to_string())
        }
        Some(peer) => peer.to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}
