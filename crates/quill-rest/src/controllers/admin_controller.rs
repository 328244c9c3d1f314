//! Cache and rate-limit administration.

use crate::responses::{ok, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use quill_cache::CacheStatsSnapshot;
use quill_ratelimit::RateLimitStatus;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Create the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/invalidate", post(invalidate_cache))
        .route(
            "/rate-limits/:action/:identity",
            get(rate_limit_status).delete(clear_rate_limit),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Cache statistics.
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub enabled: bool,
    pub backend: String,
    pub namespace: String,
    #[serde(flatten)]
    pub stats: CacheStatsSnapshot,
}

/// Patterns to invalidate.
#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub patterns: Vec<String>,
}

/// Number of keys removed.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

/// Whether a rate-limit window was removed.
#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub cleared: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn cache_stats(State(state): State<AppState>) -> ApiResult<CacheStatsResponse> {
    ok(CacheStatsResponse {
        enabled: state.cache.is_enabled(),
        backend: state.cache.backend_name().to_string(),
        namespace: state.cache.namespace().to_string(),
        stats: state.cache.stats(),
    })
}

async fn clear_cache(State(state): State<AppState>) -> ApiResult<DeletedResponse> {
    let deleted = state.cache.clear_all().await?;
    info!(deleted, "Cache cleared by administrator");
    ok(DeletedResponse { deleted })
}

async fn invalidate_cache(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> ApiResult<DeletedResponse> {
    let deleted = state.cache.invalidate(&request.patterns).await?;
    info!(patterns = ?request.patterns, deleted, "Cache invalidated by administrator");
    ok(DeletedResponse { deleted })
}

async fn rate_limit_status(
    State(state): State<AppState>,
    Path((action, identity)): Path<(String, String)>,
) -> ApiResult<RateLimitStatus> {
    let policy = state.limiter.policy(&action);
    ok(state.limiter.status(&identity, &action, policy).await?)
}

async fn clear_rate_limit(
    State(state): State<AppState>,
    Path((action, identity)): Path<(String, String)>,
) -> ApiResult<ClearedResponse> {
    let cleared = state.limiter.clear(&identity, &action).await?;
    info!(identity = %identity, action = %action, cleared, "Rate limit cleared by administrator");
    ok(ClearedResponse { cleared })
}
