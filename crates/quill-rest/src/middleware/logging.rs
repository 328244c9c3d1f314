//! Request logging middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;

use super::{CACHE_STATUS_HEADER, RATE_LIMIT_REMAINING_HEADER};

/// Logs one line per request, including cache and throttling outcomes when
/// the inner middleware reported them.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };

    info!(
        target: "http",
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        cache = %header(CACHE_STATUS_HEADER),
        rate_limit_remaining = %header(RATE_LIMIT_REMAINING_HEADER),
        duration_ms = start.elapsed().as_millis() as u64,
        "HTTP request completed"
    );

    response
}
