//! Operation execution
//!
//! Dispatches an authorized operation to the adapter for the connector's
//! type. Adapters receive the decrypted payload by reference for the
//! duration of one call and never keep it; the vault guard owns the
//! plaintext and wipes it afterwards.
//!
//! The crate ships one built-in adapter, [`HttpExecutor`] for `api`
//! connectors. Database and object-store execution capabilities are
//! deployment-specific and register their own [`OperationExecutor`].

mod http;

pub use http::HttpExecutor;

use crate::domain::{ConnectorConfig, ConnectorCredentials, ConnectorType};
use crate::errors::{Result, VaultgateError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Result of one executed operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutput {
    /// Status reported by the real backend
    pub status_code: u16,
    /// Backend response body, parsed as JSON where possible
    pub data: Value,
    /// Response body size in bytes
    pub response_size: i64,
}

/// Adapter that performs real calls for one connector type.
///
/// Implementations must never log or retain the credential payload.
#[async_trait]
pub trait OperationExecutor: Send + Sync + std::fmt::Debug {
    /// Perform one operation against the real backend
    async fn execute(
        &self,
        config: &ConnectorConfig,
        credentials: &ConnectorCredentials,
        operation_type: &str,
        operation_data: &Value,
    ) -> Result<OperationOutput>;

    /// The connector type this adapter serves
    fn connector_type(&self) -> ConnectorType;
}

/// Registry of operation executors keyed by connector type
pub struct ExecutorRegistry {
    executors: HashMap<ConnectorType, Arc<dyn OperationExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { executors: HashMap::new() }
    }

    /// Create a registry with the built-in HTTP adapter for `api`
    /// connectors
    pub fn with_builtin_http(timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HttpExecutor::new(timeout)));
        registry
    }

    /// Register an adapter, replacing any previous one for the same type
    pub fn register(&mut self, executor: Arc<dyn OperationExecutor>) {
        let connector_type = executor.connector_type();
        info!(connector_type = %connector_type, "Registering operation executor");
        self.executors.insert(connector_type, executor);
    }

    /// Whether an adapter is registered for `connector_type`
    pub fn has_executor(&self, connector_type: ConnectorType) -> bool {
        self.executors.contains_key(&connector_type)
    }

    /// Connector types with a registered adapter
    pub fn registered_types(&self) -> Vec<ConnectorType> {
        self.executors.keys().copied().collect()
    }

    /// Dispatch one operation to the adapter for the config's type.
    ///
    /// An unregistered type is an upstream failure: the connector is
    /// valid, this deployment just cannot reach its kind of backend.
    pub async fn dispatch(
        &self,
        config: &ConnectorConfig,
        credentials: &ConnectorCredentials,
        operation_type: &str,
        operation_data: &Value,
    ) -> Result<OperationOutput> {
        let connector_type = config.connector_type();
        let executor = self.executors.get(&connector_type).ok_or_else(|| {
            VaultgateError::upstream(
                format!("No executor registered for connector type '{}'", connector_type),
                None,
            )
        })?;

        executor.execute(config, credentials, operation_type, operation_data).await
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
