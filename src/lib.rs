//! # Vaultgate
//!
//! Vaultgate is a secure proxy gateway: it vaults third-party service
//! credentials, issues opaque proxy identities in their place, and executes
//! operations against the upstream services on behalf of callers without
//! ever exposing the underlying secrets.
//!
//! ## Architecture
//!
//! ```text
//! Management API → Connector / Link Services → Credential Vault
//!       ↓                    ↓                        ↓
//! Gateway Endpoints → Policy Evaluation → Operation Executors
//!       ↓
//! Access Log
//! ```
//!
//! ## Core Components
//!
//! - **Management API**: Axum-based HTTP server for connector and link
//!   lifecycle management
//! - **Credential Vault**: AES-256-GCM encrypted storage for upstream
//!   credentials, keyed by opaque vault identifiers
//! - **Proxy Gateway**: access-control evaluation, operation dispatch, and
//!   audit logging for `/proxy` and `/share` traffic
//! - **Persistence Layer**: SQLx with SQLite for connectors, links, vault
//!   entries, and access logs
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use vaultgate::{api::start_api_server, config::AppConfig, startup::build_state, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let state = build_state(&config).await?;
//!     start_api_server(&config.server, state).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod executor;
pub mod observability;
pub mod policy;
pub mod services;
pub mod startup;
pub mod storage;
pub mod vault;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Result, VaultgateError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
