//! Shared proxy link repository
//!
//! CRUD and the use-counting update for the `shared_proxy_links` table.
//! `record_use` is the concurrency-sensitive operation: the max-uses check
//! and the increment happen in one conditional UPDATE, so two callers can
//! never both take the last remaining use.

use crate::domain::{ConnectorId, LinkId, NewSharedProxyLink, ShareId, SharedProxyLink};
use crate::errors::{Result, VaultgateError};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

/// Database row structure for shared proxy links
#[derive(Debug, Clone, FromRow)]
struct LinkRow {
    pub id: String,
    pub share_id: String,
    pub connector_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub requires_authentication: bool,
    pub allowed_users: Option<String>,
    pub allowed_domains: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "id, share_id, connector_id, name, description, is_public, \
     requires_authentication, allowed_users, allowed_domains, expires_at, max_uses, \
     current_uses, created_by, is_active, created_at, updated_at";

fn parse_list(column: Option<String>, name: &str) -> Result<Vec<String>> {
    match column {
        None => Ok(vec![]),
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| VaultgateError::internal(format!("Corrupt {} column: {}", name, e))),
    }
}

fn row_to_domain(row: LinkRow) -> Result<SharedProxyLink> {
    Ok(SharedProxyLink {
        id: LinkId::from_string(row.id),
        share_id: ShareId::from_string(row.share_id),
        connector_id: ConnectorId::from_string(row.connector_id),
        name: row.name,
        description: row.description,
        is_public: row.is_public,
        requires_authentication: row.requires_authentication,
        allowed_users: parse_list(row.allowed_users, "allowed_users")?,
        allowed_domains: parse_list(row.allowed_domains, "allowed_domains")?,
        expires_at: row.expires_at,
        max_uses: row.max_uses,
        current_uses: row.current_uses,
        created_by: row.created_by,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn encode_list(values: &[String]) -> Result<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(values)?))
    }
}

/// Repository for shared proxy link data access
#[derive(Debug, Clone)]
pub struct LinkRepository {
    pool: DbPool,
}

impl LinkRepository {
    /// Create a new link repository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new shared link record
    #[instrument(skip(self, new), fields(link_name = %new.name), name = "db_create_link")]
    pub async fn create(
        &self,
        id: &LinkId,
        share_id: &ShareId,
        new: &NewSharedProxyLink,
    ) -> Result<SharedProxyLink> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO shared_proxy_links (id, share_id, connector_id, name, description, \
             is_public, requires_authentication, allowed_users, allowed_domains, expires_at, \
             max_uses, current_uses, created_by, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, 1, $13, $14)",
        )
        .bind(id.as_str())
        .bind(share_id.as_str())
        .bind(new.connector_id.as_str())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.is_public)
        .bind(new.requires_authentication)
        .bind(encode_list(&new.allowed_users)?)
        .bind(encode_list(&new.allowed_domains)?)
        .bind(new.expires_at)
        .bind(new.max_uses)
        .bind(&new.created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to create shared link '{}'", new.name),
        })?;

        tracing::info!(
            link_id = %id,
            share_id = %share_id,
            connector_id = %new.connector_id,
            "Created shared proxy link"
        );

        self.get_by_id(id).await
    }

    /// Get a link by internal id, failing if absent
    pub async fn get_by_id(&self, id: &LinkId) -> Result<SharedProxyLink> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {} FROM shared_proxy_links WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to load shared link '{}'", id),
        })?;

        match row {
            Some(row) => row_to_domain(row),
            None => Err(VaultgateError::not_found("shared_link", id.as_str())),
        }
    }

    /// Find a link by its caller-facing share id
    #[instrument(skip(self), fields(share_id = %share_id), name = "db_find_link_by_share_id")]
    pub async fn find_by_share_id(&self, share_id: &ShareId) -> Result<Option<SharedProxyLink>> {
        let row = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {} FROM shared_proxy_links WHERE share_id = $1",
            SELECT_COLUMNS
        ))
        .bind(share_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to load shared link for share id '{}'", share_id),
        })?;

        row.map(row_to_domain).transpose()
    }

    /// List links created by one user, newest first
    #[instrument(skip(self), fields(created_by = %created_by), name = "db_list_links")]
    pub async fn list_by_creator(&self, created_by: &str) -> Result<Vec<SharedProxyLink>> {
        let rows = sqlx::query_as::<_, LinkRow>(&format!(
            "SELECT {} FROM shared_proxy_links WHERE created_by = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(created_by)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to list shared links for user '{}'", created_by),
        })?;

        rows.into_iter().map(row_to_domain).collect()
    }

    /// Soft-delete a link. Returns false when the row does not exist.
    #[instrument(skip(self), fields(link_id = %id), name = "db_deactivate_link")]
    pub async fn deactivate(&self, id: &LinkId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE shared_proxy_links SET is_active = 0, updated_at = $2 WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to deactivate shared link '{}'", id),
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Consume one use of the link.
    ///
    /// The guard conditions (active, unexpired, budget remaining) are part
    /// of the UPDATE itself; zero affected rows means the use was NOT
    /// granted. This is the only place `current_uses` changes.
    #[instrument(skip(self), fields(link_id = %id), name = "db_record_link_use")]
    pub async fn record_use(&self, id: &LinkId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE shared_proxy_links \
             SET current_uses = current_uses + 1, updated_at = $2 \
             WHERE id = $1 \
               AND is_active = 1 \
               AND (expires_at IS NULL OR expires_at > $2) \
               AND (max_uses IS NULL OR current_uses < max_uses)",
        )
        .bind(id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to record use of shared link '{}'", id),
        })?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectorType, NewProxyConnector, ProxyId, VaultId, DEFAULT_RATE_LIMIT};
    use crate::storage::{apply_schema, ConnectorRepository};
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool_with_connector() -> (DbPool, ConnectorId) {
        // Named shared-cache database so every pooled connection sees the
        // same data, required by the concurrent record_use test below
        let url =
            format!("sqlite:file:{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("in-memory pool");
        apply_schema(&pool).await.expect("schema");

        sqlx::query(
            "INSERT INTO credential_vault_entries (id, credential_type, encrypted_credentials, \
             nonce, encryption_key_id, organization_id, created_by, created_at, updated_at) \
             VALUES ('vault-1', 'api', X'00', X'000000000000000000000000', 'v1', 'org-1', \
             'user-1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("seed vault entry");

        let connector_id = ConnectorId::new();
        let connectors = ConnectorRepository::new(pool.clone());
        connectors
            .create(
                &connector_id,
                &ProxyId::generate(),
                &NewProxyConnector {
                    name: "orders".to_string(),
                    description: None,
                    connector_type: ConnectorType::Api,
                    vault_id: VaultId::from_string("vault-1".to_string()),
                    access_token_hash: "hash".to_string(),
                    is_public: true,
                    allowed_operations: vec![],
                    rate_limit: DEFAULT_RATE_LIMIT,
                    organization_id: "org-1".to_string(),
                    created_by: "user-1".to_string(),
                },
            )
            .await
            .expect("seed connector");

        (pool, connector_id)
    }

    fn new_link(connector_id: &ConnectorId) -> NewSharedProxyLink {
        NewSharedProxyLink {
            connector_id: connector_id.clone(),
            name: "partner".to_string(),
            description: None,
            is_public: false,
            requires_authentication: false,
            allowed_users: vec![],
            allowed_domains: vec![],
            expires_at: None,
            max_uses: None,
            created_by: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_roundtrip() {
        let (pool, connector_id) = test_pool_with_connector().await;
        let repo = LinkRepository::new(pool);
        let id = LinkId::new();
        let share_id = ShareId::generate();

        let mut new = new_link(&connector_id);
        new.allowed_users = vec!["dana@example.com".to_string()];
        let created = repo.create(&id, &share_id, &new).await.unwrap();

        assert_eq!(created.share_id, share_id);
        assert_eq!(created.current_uses, 0);
        assert_eq!(created.allowed_users, vec!["dana@example.com".to_string()]);
        assert!(created.allowed_domains.is_empty());

        let fetched = repo.find_by_share_id(&share_id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn record_use_respects_max_uses() {
        let (pool, connector_id) = test_pool_with_connector().await;
        let repo = LinkRepository::new(pool);
        let id = LinkId::new();

        let mut new = new_link(&connector_id);
        new.max_uses = Some(2);
        repo.create(&id, &ShareId::generate(), &new).await.unwrap();

        assert!(repo.record_use(&id).await.unwrap());
        assert!(repo.record_use(&id).await.unwrap());
        assert!(!repo.record_use(&id).await.unwrap(), "third use exceeds the budget");

        let link = repo.get_by_id(&id).await.unwrap();
        assert_eq!(link.current_uses, 2);
    }

    #[tokio::test]
    async fn record_use_refuses_expired_links() {
        let (pool, connector_id) = test_pool_with_connector().await;
        let repo = LinkRepository::new(pool);
        let id = LinkId::new();

        let mut new = new_link(&connector_id);
        new.expires_at = Some(Utc::now() - Duration::hours(1));
        repo.create(&id, &ShareId::generate(), &new).await.unwrap();

        assert!(!repo.record_use(&id).await.unwrap());
        assert_eq!(repo.get_by_id(&id).await.unwrap().current_uses, 0);
    }

    #[tokio::test]
    async fn record_use_refuses_deactivated_links() {
        let (pool, connector_id) = test_pool_with_connector().await;
        let repo = LinkRepository::new(pool);
        let id = LinkId::new();
        repo.create(&id, &ShareId::generate(), &new_link(&connector_id)).await.unwrap();

        assert!(repo.deactivate(&id).await.unwrap());
        assert!(!repo.record_use(&id).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_uses_never_exceed_budget() {
        let (pool, connector_id) = test_pool_with_connector().await;
        let repo = LinkRepository::new(pool);
        let id = LinkId::new();

        let mut new = new_link(&connector_id);
        new.max_uses = Some(3);
        repo.create(&id, &ShareId::generate(), &new).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let repo = repo.clone();
            let id = id.clone();
            tasks.spawn(async move { repo.record_use(&id).await.unwrap() });
        }

        let mut granted = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        assert_eq!(repo.get_by_id(&id).await.unwrap().current_uses, 3);
    }
}
