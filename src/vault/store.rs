//! Vault entry storage
//!
//! Persists encrypted connection payloads in `credential_vault_entries`
//! and hands plaintext back only through the [`RevealedCredentials`]
//! guard. Every reveal touches the entry's usage counters.

use crate::domain::{ConnectorConfig, ConnectorCredentials, VaultId};
use crate::errors::{Result, VaultgateError};
use crate::storage::DbPool;
use crate::vault::CredentialEncryption;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;
use tracing::instrument;
use zeroize::Zeroize;

/// Serialized form of a vault entry before encryption
#[derive(Serialize)]
struct VaultPayloadRef<'a> {
    config: &'a ConnectorConfig,
    credentials: &'a ConnectorCredentials,
}

#[derive(Deserialize)]
struct VaultPayload {
    config: ConnectorConfig,
    credentials: ConnectorCredentials,
}

/// Transiently decrypted connection payload.
///
/// Owned by exactly one gateway dispatch. Not `Clone`; the credential
/// half zeroizes itself when the guard is dropped, on every exit path.
pub struct RevealedCredentials {
    config: ConnectorConfig,
    credentials: ConnectorCredentials,
}

impl RevealedCredentials {
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn credentials(&self) -> &ConnectorCredentials {
        &self.credentials
    }
}

impl std::fmt::Debug for RevealedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealedCredentials")
            .field("config", &self.config.connector_type())
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

#[derive(FromRow)]
struct VaultRow {
    pub encrypted_credentials: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Encrypted credential store
#[derive(Clone)]
pub struct CredentialVault {
    pool: DbPool,
    encryption: Arc<CredentialEncryption>,
}

impl CredentialVault {
    /// Create a new vault over an existing pool and encryption service
    pub fn new(pool: DbPool, encryption: Arc<CredentialEncryption>) -> Self {
        Self { pool, encryption }
    }

    /// Create a new vault with encryption keyed from the environment
    pub fn with_env_encryption(pool: DbPool) -> Result<Self> {
        let encryption = CredentialEncryption::from_env()?;
        Ok(Self { pool, encryption: Arc::new(encryption) })
    }

    /// Encrypt and persist one connection payload. Returns the vault
    /// reference the connector record will carry.
    #[instrument(
        skip(self, config, credentials),
        fields(credential_type = %config.connector_type(), organization_id = %organization_id),
        name = "vault_store"
    )]
    pub async fn store(
        &self,
        organization_id: &str,
        created_by: &str,
        config: &ConnectorConfig,
        credentials: &ConnectorCredentials,
    ) -> Result<VaultId> {
        let id = VaultId::new();
        let now = Utc::now();

        let mut plaintext = serde_json::to_vec(&VaultPayloadRef { config, credentials })
            .map_err(|e| {
                VaultgateError::internal(format!("Failed to serialize vault payload: {}", e))
            })?;
        let sealed = self.encryption.encrypt(&plaintext);
        plaintext.zeroize();
        let (encrypted, nonce) = sealed?;

        sqlx::query(
            "INSERT INTO credential_vault_entries (id, credential_type, encrypted_credentials, \
             nonce, encryption_key_id, organization_id, created_by, is_active, usage_count, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 1, 0, $8, $9)",
        )
        .bind(id.as_str())
        .bind(config.connector_type().as_str())
        .bind(&encrypted)
        .bind(&nonce)
        .bind(self.encryption.key_version())
        .bind(organization_id)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: "Failed to store vault entry".to_string(),
        })?;

        tracing::info!(
            vault_id = %id,
            credential_type = %config.connector_type(),
            key_version = %self.encryption.key_version(),
            "Stored encrypted vault entry"
        );

        Ok(id)
    }

    /// Decrypt one entry for a single dispatch.
    ///
    /// Fails with `NotFound` when the reference is unknown or inactive.
    /// Touches `usage_count` and `last_used_at` on success.
    #[instrument(skip(self), fields(vault_id = %vault_id), name = "vault_reveal")]
    pub async fn reveal(&self, vault_id: &VaultId) -> Result<RevealedCredentials> {
        let row = self.load_active(vault_id).await?;

        let mut plaintext = self.encryption.decrypt(&row.encrypted_credentials, &row.nonce)?;
        let parsed: std::result::Result<VaultPayload, _> = serde_json::from_slice(&plaintext);
        plaintext.zeroize();
        let payload = parsed.map_err(|e| {
            VaultgateError::internal(format!("Corrupt vault payload for entry: {}", e))
        })?;

        sqlx::query(
            "UPDATE credential_vault_entries \
             SET usage_count = usage_count + 1, last_used_at = $2 WHERE id = $1",
        )
        .bind(vault_id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to touch vault entry '{}'", vault_id),
        })?;

        Ok(RevealedCredentials { config: payload.config, credentials: payload.credentials })
    }

    /// Re-encrypt one entry under the currently active key.
    ///
    /// The entry's `encryption_key_id` is updated to the active key
    /// version; the old ciphertext and nonce are replaced.
    #[instrument(skip(self), fields(vault_id = %vault_id), name = "vault_rotate_key")]
    pub async fn rotate_key(&self, vault_id: &VaultId) -> Result<()> {
        let row = self.load_active(vault_id).await?;

        let mut plaintext = self.encryption.decrypt(&row.encrypted_credentials, &row.nonce)?;
        let sealed = self.encryption.encrypt(&plaintext);
        plaintext.zeroize();
        let (encrypted, nonce) = sealed?;

        sqlx::query(
            "UPDATE credential_vault_entries \
             SET encrypted_credentials = $2, nonce = $3, encryption_key_id = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(vault_id.as_str())
        .bind(&encrypted)
        .bind(&nonce)
        .bind(self.encryption.key_version())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to rotate key for vault entry '{}'", vault_id),
        })?;

        tracing::info!(
            vault_id = %vault_id,
            key_version = %self.encryption.key_version(),
            "Re-encrypted vault entry"
        );

        Ok(())
    }

    /// Retire an entry. Reveal refuses retired entries; the ciphertext
    /// stays on disk for audit.
    #[instrument(skip(self), fields(vault_id = %vault_id), name = "vault_deactivate")]
    pub async fn deactivate(&self, vault_id: &VaultId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE credential_vault_entries SET is_active = 0, updated_at = $2 WHERE id = $1",
        )
        .bind(vault_id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to deactivate vault entry '{}'", vault_id),
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_active(&self, vault_id: &VaultId) -> Result<VaultRow> {
        let row = sqlx::query_as::<_, VaultRow>(
            "SELECT encrypted_credentials, nonce FROM credential_vault_entries \
             WHERE id = $1 AND is_active = 1",
        )
        .bind(vault_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultgateError::Database {
            source: e,
            context: format!("Failed to load vault entry '{}'", vault_id),
        })?;

        row.ok_or_else(|| VaultgateError::not_found("vault_entry", vault_id.as_str()))
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("pool", &"[DbPool]")
            .field("encryption", &self.encryption)
            .finish()
    }
}
