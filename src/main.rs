use tracing::info;
use vaultgate::{
    api::start_api_server,
    config::{AppConfig, ObservabilityConfig},
    observability::init_observability,
    startup::{build_state, spawn_rate_window_sweeper},
    Result, APP_NAME, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        // Only warn if the error is NOT "file not found"
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let observability_config = ObservabilityConfig::from_env();
    init_observability(&observability_config)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting Vaultgate secure proxy gateway");

    let config = AppConfig::from_env()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        database = %config.database.url,
        metrics_enabled = observability_config.enable_metrics,
        "Loaded configuration from environment"
    );

    let state = build_state(&config).await?;
    spawn_rate_window_sweeper(&state, config.gateway.rate_limit_window());

    start_api_server(&config.server, state).await
}
