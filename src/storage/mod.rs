//! # Storage and Persistence
//!
//! Database connectivity and persistence layer for connectors, shared
//! links and access logs. The credential vault keeps its own storage in
//! [`crate::vault`] so encrypted material never crosses this module.

pub mod pool;
pub mod repositories;
pub mod schema;

pub use crate::config::DatabaseConfig;

pub use pool::{create_pool, DbPool};
pub use repositories::{
    AccessLogRepository, AccessLogStats, ConnectorRepository, LinkRepository,
};
pub use schema::apply_schema;

use crate::errors::{Result, VaultgateError};

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| VaultgateError::Database {
        source: e,
        context: "Database connectivity check failed".to_string(),
    })?;

    Ok(())
}

/// Whether a sqlx error is a SQLite unique-constraint violation.
///
/// Used to retry handle generation on the (astronomically rare) collision
/// and to surface duplicate inserts as conflicts.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        // SQLITE_CONSTRAINT_UNIQUE (2067) / SQLITE_CONSTRAINT_PRIMARYKEY (1555)
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("2067") | Some("1555"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_check_connection() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");

        check_connection(&pool).await.expect("connectivity check");
    }

    #[tokio::test]
    async fn test_unique_violation_detection() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");

        sqlx::query("CREATE TABLE demo (id TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .expect("create table");
        sqlx::query("INSERT INTO demo (id) VALUES ('a')")
            .execute(&pool)
            .await
            .expect("first insert");

        let err = sqlx::query("INSERT INTO demo (id) VALUES ('a')")
            .execute(&pool)
            .await
            .expect_err("duplicate insert must fail");

        assert!(is_unique_violation(&err));
    }
}
