//! # Error Handling
//!
//! Error types for the vaultgate proxy gateway, built on `thiserror`. All
//! fallible operations in the crate return [`Result`], and the HTTP layer
//! maps [`VaultgateError`] onto response status codes via
//! [`VaultgateError::status_code`].

mod types;

pub use types::{AuthErrorType, Result, VaultgateError};
