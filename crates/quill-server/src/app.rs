//! Application wiring.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use quill_cache::CacheLayer;
use quill_config::{AppConfig, ObservabilityConfig, RedisConfig};
use quill_core::{LogFormat, LoggingConfig, QuillError, QuillResult, SharedClock, SystemClock};
use quill_ratelimit::RateLimiter;
use quill_rest::{create_router, AppState};
use quill_store::{MemoryStore, RedisStore, SharedStore};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// The assembled server: configuration plus the shared components.
pub struct App {
    config: AppConfig,
    state: AppState,
    metrics: Option<PrometheusHandle>,
}

impl App {
    /// Connects the store and builds every component from configuration.
    pub async fn build(config: AppConfig) -> QuillResult<Self> {
        let clock: SharedClock = Arc::new(SystemClock);
        let store = build_store(&config.redis, clock.clone()).await?;
        Ok(Self::with_store(config, store, clock))
    }

    /// Builds the components around an existing store.
    pub fn with_store(config: AppConfig, store: SharedStore, clock: SharedClock) -> Self {
        let cache = Arc::new(CacheLayer::from_config(
            store.clone(),
            clock.clone(),
            &config.cache,
        ));
        let limiter = Arc::new(RateLimiter::from_config(
            store.clone(),
            clock,
            &config.rate_limit,
        ));
        let state = AppState::new(cache, limiter, store)
            .with_rate_limit_enabled(config.rate_limit.enabled);

        Self {
            config,
            state,
            metrics: None,
        }
    }

    /// Exposes the Prometheus registry on the configured metrics path.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        let router = create_router(self.state.clone(), &self.config.server);
        match &self.metrics {
            Some(handle) => {
                let handle = handle.clone();
                router.route(
                    &self.config.observability.metrics_path,
                    get(move || {
                        let handle = handle.clone();
                        async move { handle.render() }
                    }),
                )
            }
            None => router,
        }
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> QuillResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.server.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| QuillError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        info!("Listening on http://{}", addr);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| QuillError::Internal(format!("HTTP server error: {}", e)))?;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Connects to Redis, or falls back to an in-memory store when Redis is
/// disabled.
///
/// An unreachable Redis does not stop startup; the cache and limiter fail
/// open until it answers.
pub async fn build_store(config: &RedisConfig, clock: SharedClock) -> QuillResult<SharedStore> {
    if !config.enabled {
        warn!("Redis disabled; using in-memory store, limits are per process");
        return Ok(Arc::new(MemoryStore::new(clock)));
    }

    let store = RedisStore::connect(config).await?;
    info!(url = %config.url, "Using Redis store");
    Ok(Arc::new(store))
}

/// Installs the Prometheus recorder and describes every metric.
pub fn install_metrics(config: &ObservabilityConfig) -> QuillResult<Option<PrometheusHandle>> {
    if !config.metrics_enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| QuillError::Internal(format!("Failed to install metrics recorder: {}", e)))?;
    quill_cache::metrics::register_metrics();
    quill_ratelimit::metrics::register_metrics();
    Ok(Some(handle))
}

/// Tracing settings derived from the observability section.
#[must_use]
pub fn logging_config(config: &ObservabilityConfig) -> LoggingConfig {
    let format = if config.log_format.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    LoggingConfig {
        level: format!("{},tower_http=debug", config.log_level),
        format,
    }
}
