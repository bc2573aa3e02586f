//! # Configuration Settings
//!
//! Defines the configuration structure for the vaultgate gateway.

use crate::errors::{Result, VaultgateError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|value| value.parse::<T>().ok()).unwrap_or(default)
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Gateway behavior configuration
    #[validate(nested)]
    pub gateway: GatewayConfig,

    /// Logging and metrics configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Create configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let config = Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            observability: ObservabilityConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(VaultgateError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(VaultgateError::validation("Database URL must start with 'sqlite:'"));
        }

        Url::parse(&self.server.public_url).map_err(|_| {
            VaultgateError::validation("Public URL must be a valid absolute URL")
        })?;

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// External base URL used when building share links
    #[validate(length(min = 1, message = "Public URL cannot be empty"))]
    pub public_url: String,

    /// Enable permissive CORS on the management API
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_url: "http://127.0.0.1:8080".to_string(),
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Create ServerConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("VAULTGATE_SERVER_HOST").unwrap_or(defaults.host),
            port: env_parse("VAULTGATE_SERVER_PORT", defaults.port),
            public_url: std::env::var("VAULTGATE_PUBLIC_URL").unwrap_or(defaults.public_url),
            enable_cors: env_parse("VAULTGATE_ENABLE_CORS", defaults.enable_cors),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/vaultgate.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_seconds: env_parse(
                "DATABASE_CONNECT_TIMEOUT_SECONDS",
                defaults.connect_timeout_seconds,
            ),
            idle_timeout_seconds: env_parse(
                "DATABASE_IDLE_TIMEOUT_SECONDS",
                defaults.idle_timeout_seconds,
            ),
        }
    }
}

/// Gateway behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GatewayConfig {
    /// Upper bound on one upstream dispatch, in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Execute timeout must be between 1 and 300 seconds"
    ))]
    pub execute_timeout_seconds: u64,

    /// Length of one rate-limit window, in seconds
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Rate limit window must be between 1 and 3600 seconds"
    ))]
    pub rate_limit_window_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { execute_timeout_seconds: 30, rate_limit_window_seconds: 60 }
    }
}

impl GatewayConfig {
    /// Get the dispatch timeout as Duration
    pub fn execute_timeout(&self) -> Duration {
        Duration::from_secs(self.execute_timeout_seconds)
    }

    /// Get the rate-limit window as Duration
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    /// Create GatewayConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            execute_timeout_seconds: env_parse(
                "VAULTGATE_GATEWAY_EXECUTE_TIMEOUT_SECS",
                defaults.execute_timeout_seconds,
            ),
            rate_limit_window_seconds: env_parse(
                "VAULTGATE_GATEWAY_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_seconds,
            ),
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to metrics and logs
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Default log filter when RUST_LOG is not set
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit logs as JSON instead of human-readable lines
    pub log_json: bool,

    /// Expose a Prometheus scrape endpoint
    pub enable_metrics: bool,

    /// Port for the Prometheus exporter
    #[validate(range(min = 1, max = 65535, message = "Metrics port must be between 1 and 65535"))]
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "vaultgate".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            enable_metrics: false,
            metrics_port: 9090,
        }
    }
}

impl ObservabilityConfig {
    /// Bind address for the Prometheus exporter
    pub fn metrics_bind_address(&self) -> String {
        format!("127.0.0.1:{}", self.metrics_port)
    }

    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("VAULTGATE_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("VAULTGATE_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env_parse("VAULTGATE_LOG_JSON", defaults.log_json),
            enable_metrics: env_parse("VAULTGATE_ENABLE_METRICS", defaults.enable_metrics),
            metrics_port: env_parse("VAULTGATE_METRICS_PORT", defaults.metrics_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_observability_defaults() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_bind_address(), "127.0.0.1:9090");
        assert!(!config.log_json);
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_server_config_bind_address() {
        let config = ServerConfig { host: "0.0.0.0".to_string(), port: 8080, ..Default::default() };
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_database_config_timeouts() {
        let config = DatabaseConfig {
            connect_timeout_seconds: 15,
            idle_timeout_seconds: 300,
            ..Default::default()
        };
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));

        let config_no_idle = DatabaseConfig { idle_timeout_seconds: 0, ..Default::default() };
        assert_eq!(config_no_idle.idle_timeout(), None);
    }

    #[test]
    fn test_gateway_config_durations() {
        let config =
            GatewayConfig { execute_timeout_seconds: 5, rate_limit_window_seconds: 120 };
        assert_eq!(config.execute_timeout(), Duration::from_secs(5));
        assert_eq!(config.rate_limit_window(), Duration::from_secs(120));
    }

    #[test]
    fn test_config_validation_errors() {
        // Non-sqlite database URL
        let mut config = AppConfig::default();
        config.database.url = "postgresql://localhost/test".to_string();
        assert!(config.validate().is_err());

        // Unparseable public URL
        let mut config = AppConfig::default();
        config.server.public_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_ranges() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gateway.execute_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }
}
