use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::VaultgateError;

use super::routes::{build_router_with_options, ApiState};

/// Bind the management API and serve until a shutdown signal arrives.
pub async fn start_api_server(config: &ServerConfig, state: ApiState) -> crate::Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| VaultgateError::config(format!("Invalid API address: {}", e)))?;

    let router = build_router_with_options(state, config.enable_cors);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| VaultgateError::config(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, "Starting HTTP API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "API server shutdown listener failed");
            }
        })
        .await
        .map_err(|e| VaultgateError::internal(format!("API server error: {}", e)))?;

    info!("API server shutdown completed");
    Ok(())
}
