//! Credential encryption using AES-256-GCM
//!
//! Wraps every vault entry's credential blob before it reaches the
//! database. Each entry gets its own random 12-byte nonce; the
//! authentication tag rides at the end of the ciphertext.
//!
//! The master key comes from `VAULTGATE_VAULT_KEY` (base64, 32 bytes).
//! `VAULTGATE_VAULT_KEY_VERSION` names the key generation so entries
//! written under an old key stay identifiable after a rotation.

use crate::errors::{Result, VaultgateError};
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error};

/// AES-256-GCM nonce size in bytes
const NONCE_SIZE: usize = 12;

/// AES-256-GCM authentication tag size in bytes
const TAG_SIZE: usize = 16;

/// Master key material for the credential vault
#[derive(Debug, Clone)]
pub struct CredentialEncryptionConfig {
    /// Base64-encoded 32-byte master key
    pub master_key_base64: String,
    /// Key generation label recorded on every vault entry
    pub key_version: String,
}

impl CredentialEncryptionConfig {
    /// Load the master key from the environment
    pub fn from_env() -> Result<Self> {
        let master_key_base64 = std::env::var("VAULTGATE_VAULT_KEY").map_err(|_| {
            VaultgateError::config(
                "VAULTGATE_VAULT_KEY environment variable not set. \
                 Generate a key with: openssl rand -base64 32",
            )
        })?;

        let key_version =
            std::env::var("VAULTGATE_VAULT_KEY_VERSION").unwrap_or_else(|_| "v1".to_string());

        Ok(Self { master_key_base64, key_version })
    }

    /// Fixed-key configuration for tests. Never use outside a test harness.
    pub fn for_testing() -> Self {
        let test_key = [0x42u8; 32];
        Self {
            master_key_base64: base64::engine::general_purpose::STANDARD.encode(test_key),
            key_version: "test".to_string(),
        }
    }
}

/// One-shot nonce sequence; ring requires a sequence even for single use
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Credential encryption service shared across the vault
#[derive(Clone)]
pub struct CredentialEncryption {
    key_bytes: Arc<[u8; 32]>,
    key_version: String,
    rng: Arc<SystemRandom>,
}

impl CredentialEncryption {
    /// Build the service, validating the key length up front
    pub fn new(config: &CredentialEncryptionConfig) -> Result<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&config.master_key_base64)
            .map_err(|e| {
                VaultgateError::config(format!("Invalid base64 in VAULTGATE_VAULT_KEY: {}", e))
            })?;

        if decoded.len() != 32 {
            return Err(VaultgateError::config(format!(
                "VAULTGATE_VAULT_KEY must decode to 32 bytes, got {} bytes",
                decoded.len()
            )));
        }

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&decoded);

        debug!(key_version = %config.key_version, "Credential encryption initialized");

        Ok(Self {
            key_bytes: Arc::new(key_bytes),
            key_version: config.key_version.clone(),
            rng: Arc::new(SystemRandom::new()),
        })
    }

    /// Convenience constructor from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(&CredentialEncryptionConfig::from_env()?)
    }

    pub fn key_version(&self) -> &str {
        &self.key_version
    }

    /// Encrypt a credential blob.
    ///
    /// Returns (ciphertext with tag appended, 12-byte nonce). Both are
    /// stored alongside the entry; neither is secret on its own.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Nonce generation failed");
            VaultgateError::encryption("Failed to generate nonce for credential encryption")
        })?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes)
            .map_err(|_| VaultgateError::encryption("Failed to initialize encryption key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut ciphertext = plaintext.to_vec();
        ciphertext.reserve(TAG_SIZE);
        sealing_key.seal_in_place_append_tag(Aad::empty(), &mut ciphertext).map_err(|_| {
            error!("Credential encryption failed");
            VaultgateError::encryption("Failed to encrypt credentials")
        })?;

        Ok((ciphertext, nonce_bytes.to_vec()))
    }

    /// Decrypt a credential blob previously produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails if the nonce length is wrong, the tag is missing, or the
    /// ciphertext was tampered with.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(VaultgateError::encryption(format!(
                "Invalid nonce length: expected {} bytes, got {}",
                NONCE_SIZE,
                nonce.len()
            )));
        }
        if ciphertext.len() < TAG_SIZE {
            return Err(VaultgateError::encryption(
                "Ciphertext too short to carry an authentication tag",
            ));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let unbound_key = UnboundKey::new(&AES_256_GCM, &*self.key_bytes)
            .map_err(|_| VaultgateError::encryption("Failed to initialize decryption key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut buffer = ciphertext.to_vec();
        let plaintext = opening_key.open_in_place(Aad::empty(), &mut buffer).map_err(|_| {
            error!("Credential decryption failed, wrong key or tampered data");
            VaultgateError::encryption("Failed to decrypt credentials")
        })?;

        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for CredentialEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEncryption")
            .field("key_version", &self.key_version)
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_encryption() -> CredentialEncryption {
        CredentialEncryption::new(&CredentialEncryptionConfig::for_testing()).unwrap()
    }

    #[test]
    fn roundtrip_restores_plaintext() {
        let encryption = test_encryption();
        let plaintext = b"{\"scheme\":\"bearer\",\"token\":\"abc\"}";

        let (ciphertext, nonce) = encryption.encrypt(plaintext).unwrap();
        assert_eq!(nonce.len(), NONCE_SIZE);
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let decrypted = encryption.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let encryption = test_encryption();

        let (first, nonce1) = encryption.encrypt(b"same input").unwrap();
        let (second, nonce2) = encryption.encrypt(b"same input").unwrap();

        assert_ne!(nonce1, nonce2);
        assert_ne!(first, second);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let encryption = test_encryption();
        let (mut ciphertext, nonce) = encryption.encrypt(b"credentials").unwrap();

        ciphertext[0] ^= 0xFF;

        assert!(encryption.decrypt(&ciphertext, &nonce).is_err());
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let encryption = test_encryption();
        let (ciphertext, _) = encryption.encrypt(b"credentials").unwrap();

        assert!(encryption.decrypt(&ciphertext, &[0u8; NONCE_SIZE]).is_err());
    }

    #[test]
    fn short_nonce_is_rejected_before_decryption() {
        let encryption = test_encryption();
        let (ciphertext, _) = encryption.encrypt(b"credentials").unwrap();

        let err = encryption.decrypt(&ciphertext, &[0u8; 8]).unwrap_err();
        assert!(err.to_string().contains("nonce length"));
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let encryption = test_encryption();
        assert!(encryption.decrypt(&[0u8; 4], &[0u8; NONCE_SIZE]).is_err());
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let encryption = test_encryption();
        let (ciphertext, nonce) = encryption.encrypt(b"credentials").unwrap();

        let other = CredentialEncryption::new(&CredentialEncryptionConfig {
            master_key_base64: base64::engine::general_purpose::STANDARD.encode([0x17u8; 32]),
            key_version: "other".to_string(),
        })
        .unwrap();

        assert!(other.decrypt(&ciphertext, &nonce).is_err());
    }

    #[test]
    fn short_master_key_is_rejected() {
        let config = CredentialEncryptionConfig {
            master_key_base64: base64::engine::general_purpose::STANDARD.encode([0u8; 16]),
            key_version: "bad".to_string(),
        };

        assert!(CredentialEncryption::new(&config).is_err());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let config = CredentialEncryptionConfig {
            master_key_base64: "not base64!!!".to_string(),
            key_version: "bad".to_string(),
        };

        assert!(CredentialEncryption::new(&config).is_err());
    }

    #[test]
    fn debug_output_redacts_key_material() {
        let rendered = format!("{:?}", test_encryption());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("0x42"));
    }
}
