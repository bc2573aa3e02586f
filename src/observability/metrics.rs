//! # Metrics Collection
//!
//! Prometheus metrics for the proxy pipeline and the credential vault.
//! All recorders are free functions over the `metrics` facade; without an
//! installed exporter they cost one atomic load and do nothing.

use crate::config::ObservabilityConfig;
use crate::errors::{Result, VaultgateError};
use ::tracing::info;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter and register metric descriptions.
///
/// Must run inside a Tokio runtime; the exporter spawns its own listener
/// task.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let addr_string = config.metrics_bind_address();
    let socket_addr: SocketAddr = addr_string.parse().map_err(|e| {
        VaultgateError::config(format!("Invalid metrics bind address '{}': {}", addr_string, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", config.service_name.clone())
        .install()
        .map_err(|e| {
            VaultgateError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    describe_metrics();

    info!(metrics_addr = %addr_string, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "proxy_requests_total",
        Unit::Count,
        "Proxied attempts by connector type and final status"
    );
    describe_counter!(
        "proxy_denials_total",
        Unit::Count,
        "Denied proxy attempts by reason"
    );
    describe_histogram!(
        "proxy_request_duration_seconds",
        Unit::Seconds,
        "End-to-end duration of one proxied attempt"
    );
    describe_counter!(
        "vault_operations_total",
        Unit::Count,
        "Credential vault operations by kind and outcome"
    );
    describe_counter!(
        "access_log_write_failures_total",
        Unit::Count,
        "Access-log rows that failed to persist"
    );
    describe_counter!(
        "access_tokens_issued_total",
        Unit::Count,
        "Connector access tokens issued, by creation or rotation"
    );
}

/// Record one finished proxy attempt, resolved or not.
pub fn record_proxy_request(connector_type: &str, status: u16, duration_seconds: f64) {
    let labels =
        [("connector_type", connector_type.to_string()), ("status", status.to_string())];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds").record(duration_seconds);
}

/// Record a denial by its stable reason code.
pub fn record_proxy_denial(reason: &str) {
    counter!("proxy_denials_total", "reason" => reason.to_string()).increment(1);
}

/// Record a vault store/reveal/deactivate and whether it succeeded.
pub fn record_vault_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "vault_operations_total",
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record an access-log row that could not be written.
pub fn record_access_log_failure() {
    counter!("access_log_write_failures_total").increment(1);
}

/// Record an issued connector access token ("create" or "rotate").
pub fn record_access_token_issued(kind: &str) {
    counter!("access_tokens_issued_total", "kind" => kind.to_string()).increment(1);
}
