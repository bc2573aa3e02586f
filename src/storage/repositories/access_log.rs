//! Access log repository
//!
//! Append-only persistence for proxy access attempts. Rows reference a
//! connector when the handle resolved; unresolved handles are recorded
//! with a NULL connector so probing still leaves a trail.

use crate::domain::{ConnectorId, LinkId, NewAccessLogEntry, ProxyAccessLog};
use crate::errors::{Result, VaultgateError};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

/// Database row structure for access log entries
#[derive(Debug, Clone, FromRow)]
struct AccessLogRow {
    pub id: i64,
    pub connector_id: Option<String>,
    pub shared_link_id: Option<String>,
    pub user_id: Option<String>,
    pub user_ip: String,
    pub user_agent: Option<String>,
    pub operation_type: String,
    pub operation_details: String,
    pub status_code: i64,
    pub response_size: i64,
    pub execution_time_ms: i64,
    pub accessed_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "id, connector_id, shared_link_id, user_id, user_ip, user_agent, \
     operation_type, operation_details, status_code, response_size, execution_time_ms, accessed_at";

fn row_to_domain(row: AccessLogRow) -> Result<ProxyAccessLog> {
    let status_code = u16::try_from(row.status_code)
        .map_err(|_| VaultgateError::internal(format!("Invalid status code {}", row.status_code)))?;

    Ok(ProxyAccessLog {
        id: row.id,
        connector_id: row.connector_id.map(ConnectorId::from_string),
        shared_link_id: row.shared_link_id.map(LinkId::from_string),
        user_id: row.user_id,
        user_ip: row.user_ip,
        user_agent: row.user_agent,
        operation_type: row.operation_type,
        operation_details: serde_json::from_str(&row.operation_details)
            .map_err(|e| VaultgateError::internal(format!("Corrupt operation_details: {}", e)))?,
        status_code,
        response_size: row.response_size,
        execution_time_ms: row.execution_time_ms,
        accessed_at: row.accessed_at,
    })
}

/// Aggregate counts over a connector's access history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessLogStats {
    pub total: i64,
    /// Attempts that reached the upstream and came back under 400
    pub allowed: i64,
    /// Attempts refused by access control (401, 403, 429)
    pub denied: i64,
    /// Attempts that failed after being allowed (500 and up)
    pub failed: i64,
}

#[derive(Debug, FromRow)]
struct StatsRow {
    pub total: i64,
    pub allowed: i64,
    pub denied: i64,
    pub failed: i64,
}

/// Repository for access log data access
#[derive(Debug, Clone)]
pub struct AccessLogRepository {
    pool: DbPool,
}

impl AccessLogRepository {
    /// Create a new access log repository
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one access attempt. Returns the generated row id.
    #[instrument(
        skip(self, entry),
        fields(operation = %entry.operation_type, status = entry.status_code),
        name = "db_record_access"
    )]
    pub async fn record(&self, entry: &NewAccessLogEntry) -> Result<i64> {
        let details = serde_json::to_string(&entry.operation_details)?;

        let result = sqlx::query(
            "INSERT INTO proxy_access_logs (connector_id, shared_link_id, user_id, user_ip, \
             user_agent, operation_type, operation_details, status_code, response_size, \
             execution_time_ms, accessed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(entry.connector_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(entry.shared_link_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(&entry.user_id)
        .bind(&entry.user_ip)
        .bind(&entry.user_agent)
        .bind(&entry.operation_type)
        .bind(details)
        .bind(i64::from(entry.status_code))
        .bind(entry.response_size)
        .bind(entry.execution_time_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: "Failed to record access log entry".to_string(),
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent attempts against one connector, newest first
    #[instrument(skip(self), fields(connector_id = %connector_id), name = "db_list_access_logs")]
    pub async fn list_recent_for_connector(
        &self,
        connector_id: &ConnectorId,
        limit: i64,
    ) -> Result<Vec<ProxyAccessLog>> {
        let rows = sqlx::query_as::<_, AccessLogRow>(&format!(
            "SELECT {} FROM proxy_access_logs WHERE connector_id = $1 \
             ORDER BY accessed_at DESC, id DESC LIMIT $2",
            SELECT_COLUMNS
        ))
        .bind(connector_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to list access logs for connector '{}'", connector_id),
        })?;

        rows.into_iter().map(row_to_domain).collect()
    }

    /// Outcome counts for one connector's whole history
    #[instrument(skip(self), fields(connector_id = %connector_id), name = "db_access_log_stats")]
    pub async fn stats_for_connector(&self, connector_id: &ConnectorId) -> Result<AccessLogStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN status_code < 400 THEN 1 ELSE 0 END), 0) AS allowed, \
             COALESCE(SUM(CASE WHEN status_code IN (401, 403, 429) THEN 1 ELSE 0 END), 0) AS denied, \
             COALESCE(SUM(CASE WHEN status_code >= 500 THEN 1 ELSE 0 END), 0) AS failed \
             FROM proxy_access_logs WHERE connector_id = $1",
        )
        .bind(connector_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to aggregate access logs for connector '{}'", connector_id),
        })?;

        Ok(AccessLogStats {
            total: row.total,
            allowed: row.allowed,
            denied: row.denied,
            failed: row.failed,
        })
    }
}
