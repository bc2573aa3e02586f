//! # Observability Infrastructure
//!
//! Structured logging through the tracing ecosystem and Prometheus
//! metrics for the gateway's hot paths. Recording functions are cheap
//! no-ops until an exporter is installed, so library code calls them
//! unconditionally.

pub mod metrics;

use crate::config::ObservabilityConfig;
use crate::errors::{Result, VaultgateError};
use ::tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging and, when enabled, the metrics exporter.
///
/// `RUST_LOG` wins over the configured default filter. Call once at
/// startup, inside the Tokio runtime so the exporter can bind its
/// listener.
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let install_result = if config.log_json {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).json().finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)
    };
    install_result.map_err(|e| {
        VaultgateError::config(format!("Failed to install tracing subscriber: {}", e))
    })?;

    if config.enable_metrics {
        metrics::init_metrics(config)?;
    }

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        log_json = config.log_json,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );
    Ok(())
}
