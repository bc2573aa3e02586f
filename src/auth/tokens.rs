//! Connector access tokens
//!
//! An access token identifies the owner of one connector for privileged
//! gateway calls. The wire format is `vgc_{connector_id}.{secret}`: the
//! id half routes the lookup, the secret half is random and stored only
//! as an Argon2id hash. The plaintext is returned exactly once, at
//! creation or rotation.

use crate::auth::hashing;
use crate::domain::ConnectorId;
use crate::errors::{Result, VaultgateError};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::sync::Arc;

/// Wire prefix for connector access tokens
pub const ACCESS_TOKEN_PREFIX: &str = "vgc_";

/// Length of the random secret half
const SECRET_LEN: usize = 48;

/// Hashes and verifies connector access token secrets
#[derive(Clone)]
pub struct AccessTokenService {
    argon2: Arc<Argon2<'static>>,
}

impl AccessTokenService {
    pub fn new() -> Self {
        Self { argon2: Arc::new(hashing::password_hasher()) }
    }

    /// Generate a fresh random secret half
    pub fn generate_secret() -> String {
        OsRng.sample_iter(&Alphanumeric).take(SECRET_LEN).map(char::from).collect()
    }

    /// Hash a secret for storage
    pub fn hash_secret(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|err| VaultgateError::internal(format!("Failed to hash token secret: {}", err)))?;
        Ok(hash.to_string())
    }

    /// Verify a candidate secret against a stored hash
    pub fn verify_secret(&self, stored: &str, candidate: &str) -> Result<bool> {
        let parsed = PasswordHash::new(stored)
            .map_err(|err| VaultgateError::internal(format!("Invalid stored hash: {}", err)))?;
        Ok(self.argon2.verify_password(candidate.as_bytes(), &parsed).is_ok())
    }
}

impl Default for AccessTokenService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AccessTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenService").finish()
    }
}

/// Assemble the caller-facing token value
pub fn format_access_token(connector_id: &ConnectorId, secret: &str) -> String {
    format!("{}{}.{}", ACCESS_TOKEN_PREFIX, connector_id, secret)
}

/// Split a presented token into its connector id and secret halves.
///
/// Returns `None` for anything that does not match the wire format; the
/// caller decides whether that means "deny" or "not a connector token".
pub fn parse_access_token(token: &str) -> Option<(ConnectorId, &str)> {
    let stripped = token.strip_prefix(ACCESS_TOKEN_PREFIX)?;
    let (id, secret) = stripped.split_once('.')?;
    if id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((ConnectorId::from_string(id.to_string()), secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_alphanumeric_and_distinct() {
        let a = AccessTokenService::generate_secret();
        let b = AccessTokenService::generate_secret();

        assert_eq!(a.len(), SECRET_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn hash_then_verify_roundtrip() {
        let service = AccessTokenService::new();
        let secret = AccessTokenService::generate_secret();

        let hash = service.hash_secret(&secret).unwrap();
        assert_ne!(hash, secret);
        assert!(hash.starts_with("$argon2id$"));

        assert!(service.verify_secret(&hash, &secret).unwrap());
        assert!(!service.verify_secret(&hash, "wrong-secret").unwrap());
    }

    #[test]
    fn token_format_roundtrip() {
        let connector_id = ConnectorId::new();
        let secret = AccessTokenService::generate_secret();
        let token = format_access_token(&connector_id, &secret);

        assert!(token.starts_with("vgc_"));

        let (parsed_id, parsed_secret) = parse_access_token(&token).unwrap();
        assert_eq!(parsed_id, connector_id);
        assert_eq!(parsed_secret, secret);
    }

    #[test]
    fn malformed_tokens_do_not_parse() {
        assert!(parse_access_token("").is_none());
        assert!(parse_access_token("vgc_").is_none());
        assert!(parse_access_token("vgc_missing-dot").is_none());
        assert!(parse_access_token("vgc_.secret-without-id").is_none());
        assert!(parse_access_token("vgc_id.").is_none());
        assert!(parse_access_token("pat_id.secret").is_none());
    }

    #[test]
    fn secret_half_may_contain_dots_in_theory() {
        // split_once keeps everything after the first dot as the secret.
        let (_, secret) = parse_access_token("vgc_abc.def.ghi").unwrap();
        assert_eq!(secret, "def.ghi");
    }
}
