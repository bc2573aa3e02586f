//! Embedded database schema
//!
//! The schema ships inside the binary and is applied at startup. Every
//! statement is idempotent (`IF NOT EXISTS`), so applying it against an
//! existing database is a no-op.

use crate::errors::{Result, VaultgateError};
use crate::storage::DbPool;

/// Idempotent DDL for all vaultgate tables.
///
/// Notes on shape:
/// - `proxy_connectors.vault_id` points into `credential_vault_entries`;
///   plaintext credentials never touch these tables.
/// - `proxy_access_logs.connector_id` is nullable: attempts that never
///   resolved to a connector are still recorded.
/// - Connectors and links are soft-deleted via `is_active`, never removed,
///   so old access logs always have something to join against.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credential_vault_entries (
    id TEXT PRIMARY KEY,
    credential_type TEXT NOT NULL,
    encrypted_credentials BLOB NOT NULL,
    nonce BLOB NOT NULL,
    encryption_key_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    last_used_at TEXT,
    usage_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS proxy_connectors (
    id TEXT PRIMARY KEY,
    proxy_id TEXT NOT NULL UNIQUE,
    access_token_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    connector_type TEXT NOT NULL,
    vault_id TEXT NOT NULL REFERENCES credential_vault_entries(id),
    is_public INTEGER NOT NULL DEFAULT 0,
    allowed_operations TEXT NOT NULL DEFAULT '[]',
    rate_limit INTEGER NOT NULL DEFAULT 100,
    organization_id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    total_requests INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_proxy_connectors_org
    ON proxy_connectors(organization_id);

CREATE TABLE IF NOT EXISTS shared_proxy_links (
    id TEXT PRIMARY KEY,
    share_id TEXT NOT NULL UNIQUE,
    connector_id TEXT NOT NULL REFERENCES proxy_connectors(id),
    name TEXT NOT NULL,
    description TEXT,
    is_public INTEGER NOT NULL DEFAULT 0,
    requires_authentication INTEGER NOT NULL DEFAULT 0,
    allowed_users TEXT,
    allowed_domains TEXT,
    expires_at TEXT,
    max_uses INTEGER,
    current_uses INTEGER NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_shared_proxy_links_connector
    ON shared_proxy_links(connector_id);
CREATE INDEX IF NOT EXISTS idx_shared_proxy_links_creator
    ON shared_proxy_links(created_by);

CREATE TABLE IF NOT EXISTS proxy_access_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    connector_id TEXT,
    shared_link_id TEXT,
    user_id TEXT,
    user_ip TEXT NOT NULL,
    user_agent TEXT,
    operation_type TEXT NOT NULL,
    operation_details TEXT NOT NULL DEFAULT '{}',
    status_code INTEGER NOT NULL,
    response_size INTEGER NOT NULL DEFAULT 0,
    execution_time_ms INTEGER NOT NULL DEFAULT 0,
    accessed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_proxy_access_logs_connector
    ON proxy_access_logs(connector_id, accessed_at);
"#;

/// Apply the embedded schema to a live pool.
pub async fn apply_schema(pool: &DbPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await.map_err(|e| VaultgateError::Database {
        source: e,
        context: "Failed to apply database schema".to_string(),
    })?;

    tracing::debug!("Database schema applied");
    Ok(())
}
