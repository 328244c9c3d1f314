//! Main application router.

use crate::{
    controllers::{admin_controller, health_controller},
    middleware::{
        admin_token_middleware, logging_middleware, require_admin, AdminToken, RouteRateLimit,
        TrustedProxies,
    },
    state::AppState,
};
use axum::{middleware, routing::get, Router};
use quill_config::ServerConfig;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{info, warn};

/// Action name the admin endpoints are charged to.
pub const ADMIN_ACTION: &str = "api";

/// Creates the main application router.
///
/// Admin endpoints require an administrator and are throttled under the
/// `api` action; health endpoints are open and never throttled.
pub fn create_router(state: AppState, server_config: &ServerConfig) -> Router {
    let proxies = TrustedProxies::new(server_config.trusted_proxy_addrs());
    let admin_limit = RouteRateLimit::new(state.limiter.clone(), ADMIN_ACTION)
        .with_trusted_proxies(proxies)
        .with_enabled(state.rate_limit_enabled);
    let admin_router =
        admin_limit.apply(admin_controller::router().layer(middleware::from_fn(require_admin)));

    let admin_router = match server_config.admin_token.as_deref() {
        Some(token) => admin_router.layer(middleware::from_fn_with_state(
            AdminToken::new(token),
            admin_token_middleware,
        )),
        None => {
            warn!("No admin token configured; admin endpoints need an upstream auth layer");
            admin_router
        }
    };

    let cors = if server_config.cors_enabled {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    let router = Router::new()
        .merge(health_controller::router())
        .nest("/admin", admin_router)
        .route("/", get(root))
        .with_state(state)
        .layer(TimeoutLayer::new(server_config.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware));

    info!("Router created with health and admin endpoints");
    router
}

/// Root endpoint handler.
async fn root() -> &'static str {
    "Quill cache and rate-limit service"
}
