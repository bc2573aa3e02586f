//! Proxy connector repository
//!
//! CRUD and counter operations for the `proxy_connectors` table. The
//! caller-facing handle (`proxy_id`) carries a unique index; create runs
//! under that index and surfaces collisions so the service layer can retry
//! with a fresh handle.

use crate::domain::{ConnectorId, ConnectorType, NewProxyConnector, ProxyConnector, ProxyId, VaultId};
use crate::errors::{Result, VaultgateError};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

/// Database row structure for proxy connectors
#[derive(Debug, Clone, FromRow)]
struct ConnectorRow {
    pub id: String,
    pub proxy_id: String,
    pub access_token_hash: String,
    pub name: String,
    pub description: Option<String>,
    pub connector_type: String,
    pub vault_id: String,
    pub is_public: bool,
    pub allowed_operations: String,
    pub rate_limit: i64,
    pub organization_id: String,
    pub created_by: String,
    pub is_active: bool,
    pub total_requests: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "id, proxy_id, access_token_hash, name, description, \
     connector_type, vault_id, is_public, allowed_operations, rate_limit, organization_id, \
     created_by, is_active, total_requests, last_accessed_at, created_at, updated_at";

fn row_to_domain(row: ConnectorRow) -> Result<ProxyConnector> {
    let connector_type = row.connector_type.parse::<ConnectorType>().map_err(|_| {
        VaultgateError::internal(format!("Unknown connector type: {}", row.connector_type))
    })?;

    let allowed_operations: Vec<String> =
        serde_json::from_str(&row.allowed_operations).map_err(|e| {
            VaultgateError::internal(format!("Corrupt allowed_operations column: {}", e))
        })?;

    let rate_limit = u32::try_from(row.rate_limit)
        .map_err(|_| VaultgateError::internal("Corrupt rate_limit column"))?;

    Ok(ProxyConnector {
        id: ConnectorId::from_string(row.id),
        proxy_id: ProxyId::from_string(row.proxy_id),
        access_token_hash: row.access_token_hash,
        name: row.name,
        description: row.description,
        connector_type,
        vault_id: VaultId::from_string(row.vault_id),
        is_public: row.is_public,
        allowed_operations,
        rate_limit,
        organization_id: row.organization_id,
        created_by: row.created_by,
        is_active: row.is_active,
        total_requests: row.total_requests,
        last_accessed_at: row.last_accessed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Repository for proxy connector data access
#[derive(Debug, Clone)]
pub struct ConnectorRepository {
    pool: DbPool,
}

impl ConnectorRepository {
    /// Create a new connector repository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new connector record.
    ///
    /// A unique-constraint violation on `proxy_id` is returned as a
    /// `Database` error; callers decide whether to retry with a new handle.
    #[instrument(skip(self, new), fields(connector_name = %new.name), name = "db_create_connector")]
    pub async fn create(
        &self,
        id: &ConnectorId,
        proxy_id: &ProxyId,
        new: &NewProxyConnector,
    ) -> Result<ProxyConnector> {
        let now = Utc::now();
        let allowed_operations = serde_json::to_string(&new.allowed_operations)?;

        sqlx::query(
            "INSERT INTO proxy_connectors (id, proxy_id, access_token_hash, name, description, \
             connector_type, vault_id, is_public, allowed_operations, rate_limit, \
             organization_id, created_by, is_active, total_requests, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1, 0, $13, $14)",
        )
        .bind(id.as_str())
        .bind(proxy_id.as_str())
        .bind(&new.access_token_hash)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.connector_type.as_str())
        .bind(new.vault_id.as_str())
        .bind(new.is_public)
        .bind(&allowed_operations)
        .bind(new.rate_limit as i64)
        .bind(&new.organization_id)
        .bind(&new.created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to create connector '{}'", new.name),
        })?;

        tracing::info!(
            connector_id = %id,
            proxy_id = %proxy_id,
            connector_type = %new.connector_type,
            organization_id = %new.organization_id,
            "Created proxy connector"
        );

        self.get_by_id(id).await
    }

    /// Get a connector by internal id, failing if absent
    pub async fn get_by_id(&self, id: &ConnectorId) -> Result<ProxyConnector> {
        self.find_by_id(id).await?.ok_or_else(|| {
            VaultgateError::not_found("proxy_connector", id.as_str())
        })
    }

    /// Find a connector by internal id
    #[instrument(skip(self), fields(connector_id = %id), name = "db_find_connector_by_id")]
    pub async fn find_by_id(&self, id: &ConnectorId) -> Result<Option<ProxyConnector>> {
        let row = sqlx::query_as::<_, ConnectorRow>(&format!(
            "SELECT {} FROM proxy_connectors WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to load connector '{}'", id),
        })?;

        row.map(row_to_domain).transpose()
    }

    /// Find a connector by its caller-facing proxy id
    #[instrument(skip(self), fields(proxy_id = %proxy_id), name = "db_find_connector_by_proxy_id")]
    pub async fn find_by_proxy_id(&self, proxy_id: &ProxyId) -> Result<Option<ProxyConnector>> {
        let row = sqlx::query_as::<_, ConnectorRow>(&format!(
            "SELECT {} FROM proxy_connectors WHERE proxy_id = $1",
            SELECT_COLUMNS
        ))
        .bind(proxy_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to load connector for proxy id '{}'", proxy_id),
        })?;

        row.map(row_to_domain).transpose()
    }

    /// List all connectors owned by an organization, newest first
    #[instrument(skip(self), fields(organization_id = %organization_id), name = "db_list_connectors")]
    pub async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<ProxyConnector>> {
        let rows = sqlx::query_as::<_, ConnectorRow>(&format!(
            "SELECT {} FROM proxy_connectors WHERE organization_id = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to list connectors for organization '{}'", organization_id),
        })?;

        rows.into_iter().map(row_to_domain).collect()
    }

    /// Soft-delete a connector. Returns false when the row does not exist.
    #[instrument(skip(self), fields(connector_id = %id), name = "db_deactivate_connector")]
    pub async fn deactivate(&self, id: &ConnectorId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE proxy_connectors SET is_active = 0, updated_at = $2 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to deactivate connector '{}'", id),
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored access-token hash after a rotation
    #[instrument(skip(self, access_token_hash), fields(connector_id = %id), name = "db_rotate_connector_token")]
    pub async fn update_access_token_hash(
        &self,
        id: &ConnectorId,
        access_token_hash: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE proxy_connectors SET access_token_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(access_token_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to rotate token for connector '{}'", id),
        })?;

        if result.rows_affected() == 0 {
            return Err(VaultgateError::not_found("proxy_connector", id.as_str()));
        }

        Ok(())
    }

    /// Bump the lifetime request counter and last-accessed stamp.
    ///
    /// A single UPDATE so concurrent gateway calls never lose increments.
    #[instrument(skip(self), fields(connector_id = %id), name = "db_increment_connector_usage")]
    pub async fn increment_usage(&self, id: &ConnectorId) -> Result<()> {
        sqlx::query(
            "UPDATE proxy_connectors \
             SET total_requests = total_requests + 1, last_accessed_at = $2 \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to increment usage for connector '{}'", id),
        })?;

        Ok(())
    }
}
