//! Server startup utilities.

use quill_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
   ____        _ ____
  / __ \__  __(_) / /
 / / / / / / / / / /
/ /_/ / /_/ / / / /
\___\_\__,_/_/_/_/

     cache + rate limits
    "#);
}

/// Prints server startup information.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let addr = config.server.addr();
    info!("{}", separator);
    info!("Environment: {}", config.app.environment);
    info!("HTTP:        http://{}", addr);
    info!("Health:      http://{}/health", addr);
    info!("Admin:       http://{}/admin/cache/stats", addr);
    if config.observability.metrics_enabled {
        info!("Metrics:     http://{}{}", addr, config.observability.metrics_path);
    }
    info!(
        "Store:       {}",
        if config.redis.enabled { "redis" } else { "memory" }
    );
    info!("{}", separator);
}
