//! # Quill Server
//!
//! Serves the cache and rate-limit administration endpoints and the
//! health checks, backed by Redis or an in-memory store.

use quill_config::ConfigLoader;
use quill_core::{init_tracing, QuillResult};
use quill_server::{install_metrics, logging_config, startup, App};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        eprintln!("quill-server: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> QuillResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    init_tracing(&logging_config(&config.observability))?;
    startup::print_banner();
    info!("Starting Quill server v{}", env!("CARGO_PKG_VERSION"));

    let metrics = install_metrics(&config.observability)?;

    let mut app = App::build(config).await?;
    if let Some(handle) = metrics {
        app = app.with_metrics(handle);
    }

    startup::print_startup_info(app.config());
    app.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
