//! Business logic for creating and managing proxy connectors.
//!
//! A connector couples a public proxy identity with a vault entry holding
//! the real endpoint configuration and credentials. This service owns the
//! lifecycle: vault the secrets, mint the handle and access token, and keep
//! the two records consistent on deactivation. Plaintext credentials pass
//! through `create_connector` once and are never persisted or returned.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::auth::{format_access_token, AccessTokenService};
use crate::domain::{
    CallerContext, ConnectorCredentials, ConnectorId, NewProxyConnector, ProxyConnector, ProxyId,
    DEFAULT_RATE_LIMIT,
};
use crate::errors::{Result, VaultgateError};
use crate::observability::metrics;
use crate::storage::{
    AccessLogRepository, AccessLogStats, ConnectorRepository, DbPool, is_unique_violation,
};
use crate::vault::CredentialVault;

/// How many fresh proxy identities to try before giving up on a collision.
const MAX_HANDLE_ATTEMPTS: u32 = 3;

const DEFAULT_ANALYTICS_LIMIT: i64 = 50;
const MAX_ANALYTICS_LIMIT: i64 = 500;

/// Everything needed to create a connector. Credentials are consumed and
/// zeroized once the vault entry is written.
#[derive(Debug)]
pub struct CreateConnectorInput {
    pub name: String,
    pub description: Option<String>,
    pub config: crate::domain::ConnectorConfig,
    pub credentials: ConnectorCredentials,
    pub is_public: bool,
    /// Empty means the connector-type default set
    pub allowed_operations: Vec<String>,
    /// Requests per rate-limit window; `None` means [`DEFAULT_RATE_LIMIT`]
    pub rate_limit: Option<u32>,
}

/// A freshly created (or re-keyed) connector together with the one-time
/// plaintext access token.
#[derive(Debug)]
pub struct CreatedConnector {
    pub connector: ProxyConnector,
    /// Shown exactly once; only the Argon2 hash is stored
    pub access_token: String,
    pub proxy_url: String,
}

/// Usage summary plus the most recent access-log entries for a connector.
#[derive(Debug)]
pub struct ConnectorAnalytics {
    pub connector: ProxyConnector,
    pub stats: AccessLogStats,
    pub recent: Vec<crate::domain::ProxyAccessLog>,
}

#[derive(Clone)]
pub struct ConnectorService {
    connectors: ConnectorRepository,
    access_logs: AccessLogRepository,
    vault: Arc<CredentialVault>,
    tokens: AccessTokenService,
    public_url: String,
}

impl ConnectorService {
    pub fn new(pool: DbPool, vault: Arc<CredentialVault>, public_url: impl Into<String>) -> Self {
        Self {
            connectors: ConnectorRepository::new(pool.clone()),
            access_logs: AccessLogRepository::new(pool),
            vault,
            tokens: AccessTokenService::new(),
            public_url: public_url.into(),
        }
    }

    /// Vault the real configuration and credentials, then mint the connector
    /// record with a fresh proxy identity and access token.
    #[instrument(
        skip(self, caller, input),
        fields(connector_name = %input.name),
        name = "create_connector"
    )]
    pub async fn create_connector(
        &self,
        caller: &CallerContext,
        input: CreateConnectorInput,
    ) -> Result<CreatedConnector> {
        let organization_id = caller.require_organization()?.to_string();
        let created_by = caller.require_user()?.to_string();

        if input.name.trim().is_empty() {
            return Err(VaultgateError::validation_field(
                "Connector name must not be empty",
                "name",
            ));
        }
        input
            .config
            .validate()
            .map_err(|e| VaultgateError::validation(format!("Invalid connector config: {}", e)))?;
        input.credentials.validate().map_err(|e| {
            VaultgateError::validation(format!("Invalid connector credentials: {}", e))
        })?;
        input.credentials.ensure_matches(&input.config).map_err(|e| {
            VaultgateError::validation(format!("Invalid connector credentials: {}", e))
        })?;

        let connector_type = input.config.connector_type();
        let allowed_operations = if input.allowed_operations.is_empty() {
            connector_type.default_operations().iter().map(|s| s.to_string()).collect()
        } else {
            for operation in &input.allowed_operations {
                if !connector_type.default_operations().contains(&operation.as_str()) {
                    return Err(VaultgateError::validation_field(
                        format!(
                            "Operation '{}' is not supported by '{}' connectors",
                            operation, connector_type
                        ),
                        "allowedOperations",
                    ));
                }
            }
            input.allowed_operations.clone()
        };

        let rate_limit = input.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT);
        if rate_limit == 0 {
            return Err(VaultgateError::validation_field(
                "Rate limit must be greater than zero",
                "rateLimit",
            ));
        }

        let vault_id =
            self.vault.store(&organization_id, &created_by, &input.config, &input.credentials).await?;
        metrics::record_vault_operation("store", true);

        let secret = AccessTokenService::generate_secret();
        let access_token_hash = match self.tokens.hash_secret(&secret) {
            Ok(hash) => hash,
            Err(err) => {
                self.release_orphaned_vault_entry(&vault_id).await;
                return Err(err);
            }
        };

        let mut attempts = 0;
        let connector = loop {
            attempts += 1;
            let connector_id = ConnectorId::new();
            let proxy_id = ProxyId::generate();
            let new = NewProxyConnector {
                name: input.name.trim().to_string(),
                description: input.description.clone(),
                connector_type,
                vault_id: vault_id.clone(),
                access_token_hash: access_token_hash.clone(),
                is_public: input.is_public,
                allowed_operations: allowed_operations.clone(),
                rate_limit,
                organization_id: organization_id.clone(),
                created_by: created_by.clone(),
            };
            match self.connectors.create(&connector_id, &proxy_id, &new).await {
                Ok(connector) => break connector,
                Err(VaultgateError::Database { ref source, .. })
                    if is_unique_violation(source) && attempts < MAX_HANDLE_ATTEMPTS =>
                {
                    warn!(attempt = attempts, "Proxy identity collision, regenerating handle");
                    continue;
                }
                Err(err) => {
                    self.release_orphaned_vault_entry(&vault_id).await;
                    return Err(err);
                }
            }
        };

        metrics::record_access_token_issued("create");
        info!(
            connector_id = %connector.id,
            proxy_id = %connector.proxy_id,
            organization_id = %organization_id,
            "Connector created with vaulted credentials"
        );

        Ok(CreatedConnector {
            access_token: format_access_token(&connector.id, &secret),
            proxy_url: self.proxy_url(&connector.proxy_id),
            connector,
        })
    }

    /// Fetch one connector in the caller's organization. Inactive connectors
    /// are still visible to their owners.
    pub async fn get_connector(
        &self,
        caller: &CallerContext,
        proxy_handle: &str,
    ) -> Result<ProxyConnector> {
        let organization_id = caller.require_organization()?;
        self.resolve_owned(organization_id, proxy_handle).await
    }

    /// All connectors in the caller's organization, newest first.
    pub async fn list_connectors(&self, caller: &CallerContext) -> Result<Vec<ProxyConnector>> {
        let organization_id = caller.require_organization()?;
        self.connectors.list_by_organization(organization_id).await
    }

    /// Soft-delete a connector and its vault entry. Idempotent: repeating the
    /// call on an already-inactive connector succeeds.
    #[instrument(skip(self, caller), name = "deactivate_connector")]
    pub async fn deactivate_connector(
        &self,
        caller: &CallerContext,
        proxy_handle: &str,
    ) -> Result<()> {
        let organization_id = caller.require_organization()?;
        let connector = self.resolve_owned(organization_id, proxy_handle).await?;

        let deactivated = self.connectors.deactivate(&connector.id).await?;
        // The vault entry goes down with the connector, so the plaintext is
        // unreachable even for code paths that skip the policy check.
        self.vault.deactivate(&connector.vault_id).await?;
        metrics::record_vault_operation("deactivate", true);

        if deactivated {
            info!(
                connector_id = %connector.id,
                proxy_id = %connector.proxy_id,
                "Connector deactivated"
            );
        }
        Ok(())
    }

    /// Issue a fresh access token, invalidating the previous one. Allowed on
    /// inactive connectors so owners can prepare before reactivation.
    #[instrument(skip(self, caller), name = "rotate_connector_token")]
    pub async fn rotate_access_token(
        &self,
        caller: &CallerContext,
        proxy_handle: &str,
    ) -> Result<CreatedConnector> {
        let organization_id = caller.require_organization()?;
        let connector = self.resolve_owned(organization_id, proxy_handle).await?;

        let secret = AccessTokenService::generate_secret();
        let access_token_hash = self.tokens.hash_secret(&secret)?;
        self.connectors.update_access_token_hash(&connector.id, &access_token_hash).await?;

        metrics::record_access_token_issued("rotate");
        info!(connector_id = %connector.id, "Connector access token rotated");

        let connector = self.connectors.get_by_id(&connector.id).await?;
        Ok(CreatedConnector {
            access_token: format_access_token(&connector.id, &secret),
            proxy_url: self.proxy_url(&connector.proxy_id),
            connector,
        })
    }

    /// Usage stats and recent access-log entries for an owned connector.
    pub async fn connector_analytics(
        &self,
        caller: &CallerContext,
        proxy_handle: &str,
        limit: Option<i64>,
    ) -> Result<ConnectorAnalytics> {
        let organization_id = caller.require_organization()?;
        let connector = self.resolve_owned(organization_id, proxy_handle).await?;

        let limit = limit.unwrap_or(DEFAULT_ANALYTICS_LIMIT).clamp(1, MAX_ANALYTICS_LIMIT);
        let stats = self.access_logs.stats_for_connector(&connector.id).await?;
        let recent = self.access_logs.list_recent_for_connector(&connector.id, limit).await?;

        Ok(ConnectorAnalytics { connector, stats, recent })
    }

    /// Resolve a proxy handle to a connector owned by `organization_id`.
    ///
    /// Absent, malformed, and foreign-organization handles all produce the
    /// same not-found error so existence cannot be probed across tenants.
    async fn resolve_owned(
        &self,
        organization_id: &str,
        proxy_handle: &str,
    ) -> Result<ProxyConnector> {
        let proxy_id = ProxyId::parse(proxy_handle)
            .map_err(|_| VaultgateError::not_found("proxy_connector", proxy_handle))?;
        self.connectors
            .find_by_proxy_id(&proxy_id)
            .await?
            .filter(|connector| connector.organization_id == organization_id)
            .ok_or_else(|| VaultgateError::not_found("proxy_connector", proxy_handle))
    }

    async fn release_orphaned_vault_entry(&self, vault_id: &crate::domain::VaultId) {
        if let Err(err) = self.vault.deactivate(vault_id).await {
            warn!(vault_id = %vault_id, error = %err, "Failed to deactivate orphaned vault entry");
        }
    }

    fn proxy_url(&self, proxy_id: &ProxyId) -> String {
        format!("{}/proxy/{}", self.public_url.trim_end_matches('/'), proxy_id)
    }
}

impl std::fmt::Debug for ConnectorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorService").field("public_url", &self.public_url).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApiConfig, ApiCredentials, ConnectorConfig};
    use crate::storage::apply_schema;
    use crate::vault::{CredentialEncryption, CredentialEncryptionConfig};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn service() -> (ConnectorService, DbPool) {
        let url =
            format!("sqlite:file:{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("in-memory pool");
        apply_schema(&pool).await.expect("schema");
        let encryption = CredentialEncryption::new(&CredentialEncryptionConfig::for_testing())
            .expect("test encryption");
        let vault = Arc::new(CredentialVault::new(pool.clone(), Arc::new(encryption)));
        (ConnectorService::new(pool.clone(), vault, "https://gateway.test"), pool)
    }

    fn owner() -> CallerContext {
        CallerContext {
            user_id: Some("user-1".to_string()),
            email: Some("owner@corp.test".to_string()),
            organization_id: Some("org-1".to_string()),
            ip: "127.0.0.1".to_string(),
            user_agent: None,
        }
    }

    fn api_input(name: &str) -> CreateConnectorInput {
        CreateConnectorInput {
            name: name.to_string(),
            description: Some("integration API".to_string()),
            config: ConnectorConfig::Api(ApiConfig {
                base_url: "https://internal-api.corp.test".to_string(),
                extra_headers: Vec::new(),
            }),
            credentials: crate::domain::ConnectorCredentials::Api(ApiCredentials::Bearer {
                token: "real-upstream-token".to_string(),
            }),
            is_public: false,
            allowed_operations: Vec::new(),
            rate_limit: None,
        }
    }

    #[tokio::test]
    async fn create_returns_one_time_token_and_defaults() {
        let (service, _pool) = service().await;

        let created = service.create_connector(&owner(), api_input("billing")).await.unwrap();

        assert!(created.access_token.starts_with("vgc_"));
        assert!(created.proxy_url.ends_with(created.connector.proxy_id.as_str()));
        assert_eq!(created.connector.allowed_operations, vec!["read", "write"]);
        assert_eq!(created.connector.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(created.connector.total_requests, 0);
        assert!(created.connector.is_active);
        // Only the hash lands in storage
        assert_ne!(created.connector.access_token_hash, created.access_token);
        assert!(created.connector.access_token_hash.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn create_requires_organization_and_user() {
        let (service, _pool) = service().await;
        let anonymous = CallerContext::anonymous("127.0.0.1", None);

        let err = service.create_connector(&anonymous, api_input("x")).await.unwrap_err();
        assert!(matches!(err, VaultgateError::Auth { .. }));
    }

    #[tokio::test]
    async fn create_rejects_unknown_operations() {
        let (service, _pool) = service().await;
        let mut input = api_input("billing");
        input.allowed_operations = vec!["read".to_string(), "delete".to_string()];

        let err = service.create_connector(&owner(), input).await.unwrap_err();
        assert!(matches!(err, VaultgateError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_rejects_zero_rate_limit() {
        let (service, _pool) = service().await;
        let mut input = api_input("billing");
        input.rate_limit = Some(0);

        let err = service.create_connector(&owner(), input).await.unwrap_err();
        assert!(matches!(err, VaultgateError::Validation { .. }));
    }

    #[tokio::test]
    async fn lookup_is_org_scoped_with_identical_not_found() {
        let (service, _pool) = service().await;
        let created = service.create_connector(&owner(), api_input("billing")).await.unwrap();
        let handle = created.connector.proxy_id.as_str();

        let foreign = CallerContext {
            organization_id: Some("org-2".to_string()),
            ..owner()
        };
        let absent_err = service.get_connector(&owner(), "pxy_aaaaaaaaaaaaaaaaaaaaaaaa").await.unwrap_err();
        let foreign_err = service.get_connector(&foreign, handle).await.unwrap_err();
        // Same wording for absent and foreign handles
        assert_eq!(absent_err.to_string().replace("pxy_aaaaaaaaaaaaaaaaaaaaaaaa", handle), foreign_err.to_string());

        let found = service.get_connector(&owner(), handle).await.unwrap();
        assert_eq!(found.id, created.connector.id);
    }

    #[tokio::test]
    async fn deactivate_is_idempotent_and_kills_vault_entry() {
        let (service, _pool) = service().await;
        let created = service.create_connector(&owner(), api_input("billing")).await.unwrap();
        let handle = created.connector.proxy_id.as_str().to_string();

        service.deactivate_connector(&owner(), &handle).await.unwrap();
        service.deactivate_connector(&owner(), &handle).await.unwrap();

        let connector = service.get_connector(&owner(), &handle).await.unwrap();
        assert!(!connector.is_active);
        // Credentials are unreachable once the connector is gone
        let err = service.vault.reveal(&connector.vault_id).await.unwrap_err();
        assert!(matches!(err, VaultgateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rotate_invalidates_previous_token() {
        let (service, _pool) = service().await;
        let created = service.create_connector(&owner(), api_input("billing")).await.unwrap();
        let handle = created.connector.proxy_id.as_str().to_string();

        let rotated = service.rotate_access_token(&owner(), &handle).await.unwrap();
        assert_ne!(rotated.access_token, created.access_token);
        assert_ne!(rotated.connector.access_token_hash, created.connector.access_token_hash);

        let tokens = AccessTokenService::new();
        let (_, old_secret) = crate::auth::parse_access_token(&created.access_token).unwrap();
        let (_, new_secret) = crate::auth::parse_access_token(&rotated.access_token).unwrap();
        assert!(!tokens.verify_secret(&rotated.connector.access_token_hash, old_secret).unwrap());
        assert!(tokens.verify_secret(&rotated.connector.access_token_hash, new_secret).unwrap());
    }

    #[tokio::test]
    async fn analytics_reports_stats_and_recent_entries() {
        let (service, pool) = service().await;
        let created = service.create_connector(&owner(), api_input("billing")).await.unwrap();

        let logs = AccessLogRepository::new(pool);
        for status in [200u16, 403, 502] {
            logs.record(&crate::domain::NewAccessLogEntry {
                connector_id: Some(created.connector.id.clone()),
                shared_link_id: None,
                user_id: None,
                user_ip: "10.0.0.9".to_string(),
                user_agent: None,
                operation_type: "read".to_string(),
                operation_details: serde_json::json!({}),
                status_code: status,
                response_size: 0,
                execution_time_ms: 5,
            })
            .await
            .unwrap();
        }

        let analytics = service
            .connector_analytics(&owner(), created.connector.proxy_id.as_str(), Some(2))
            .await
            .unwrap();
        assert_eq!(analytics.stats.total, 3);
        assert_eq!(analytics.stats.allowed, 1);
        assert_eq!(analytics.stats.denied, 1);
        assert_eq!(analytics.stats.failed, 1);
        assert_eq!(analytics.recent.len(), 2);
    }
}
