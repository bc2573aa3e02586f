//! Startup sequence: database, credential vault, executors, shared state.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::api::ApiState;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::executor::ExecutorRegistry;
use crate::storage::{apply_schema, create_pool};
use crate::vault::{CredentialEncryption, CredentialVault};

/// Build the shared application state from configuration.
///
/// Creates the connection pool, applies the schema, loads the vault
/// master key from the environment, and registers the built-in
/// executors.
pub async fn build_state(config: &AppConfig) -> Result<ApiState> {
    let pool = create_pool(&config.database).await?;
    apply_schema(&pool).await?;

    let encryption = Arc::new(CredentialEncryption::from_env()?);
    let vault = Arc::new(CredentialVault::new(pool.clone(), encryption));

    let executors =
        Arc::new(ExecutorRegistry::with_builtin_http(config.gateway.execute_timeout()));
    info!(
        executors = ?executors.registered_types(),
        "Registered operation executors"
    );

    Ok(ApiState::new(
        pool,
        vault,
        executors,
        config.server.public_url.clone(),
        config.gateway.execute_timeout(),
        config.gateway.rate_limit_window(),
    ))
}

/// Spawn the background task that drops expired rate-limit windows.
pub fn spawn_rate_window_sweeper(state: &ApiState, every: Duration) {
    let gateway = state.gateway.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            gateway.sweep_rate_windows();
        }
    });
}
