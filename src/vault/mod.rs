//! Credential vault
//!
//! Encrypted-at-rest storage for the real connection configuration and
//! secrets behind each proxy connector. Everything outside this module
//! handles a [`VaultId`](crate::domain::VaultId) reference; plaintext
//! exists only inside a [`RevealedCredentials`] guard obtained for a
//! single dispatch and wiped on drop.

mod encryption;
mod store;

pub use encryption::{CredentialEncryption, CredentialEncryptionConfig};
pub use store::{CredentialVault, RevealedCredentials};
