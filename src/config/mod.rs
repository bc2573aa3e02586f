//! # Configuration Management
//!
//! Environment-driven configuration for the vaultgate gateway. Every
//! section has sensible defaults, reads `VAULTGATE_*` overrides (plus the
//! conventional `DATABASE_URL`), and is validated before the application
//! starts.

mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, GatewayConfig, ObservabilityConfig, ServerConfig,
};
