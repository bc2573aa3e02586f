//! # Error Types
//!
//! The crate-wide error taxonomy. Gateway denials carry their
//! [`DenyReason`] so the audit trail and the HTTP response always agree on
//! the reason code and status.

use std::fmt;

use crate::policy::DenyReason;

/// Custom result type for vaultgate operations
pub type Result<T> = std::result::Result<T, VaultgateError>;

/// Main error type for the vaultgate proxy gateway
#[derive(thiserror::Error, Debug)]
pub enum VaultgateError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Authentication errors on the management surface
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        error_type: AuthErrorType,
    },

    /// Policy denial on the gateway path. Expected traffic, not a fault:
    /// logged as an audit record, never at error severity.
    #[error("Access denied: {0}")]
    Denied(DenyReason),

    /// Vault encryption/decryption failures. The message never carries key
    /// material or ciphertext.
    #[error("Encryption error: {message}")]
    Encryption {
        message: String,
    },

    /// Failures reported by the proxied backend. Detail is sanitized before
    /// it gets here.
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        status: Option<u16>,
    },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound {
        resource_type: String,
        id: String,
    },

    /// Resource conflict errors (e.g., already exists)
    #[error("Resource conflict: {message}")]
    Conflict {
        message: String,
        resource_type: String,
    },

    /// Timeout errors
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, PartialEq)]
pub enum AuthErrorType {
    InvalidToken,
    MissingIdentity,
    MissingOrganization,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::InvalidToken => write!(f, "invalid_token"),
            AuthErrorType::MissingIdentity => write!(f, "missing_identity"),
            AuthErrorType::MissingOrganization => write!(f, "missing_organization"),
        }
    }
}

impl VaultgateError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Create an encryption error
    pub fn encryption<S: Into<String>>(message: S) -> Self {
        Self::Encryption { message: message.into() }
    }

    /// Create an upstream error
    pub fn upstream<S: Into<String>>(message: S, status: Option<u16>) -> Self {
        Self::Upstream { message: message.into(), status }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            VaultgateError::Config { .. } => 500,
            VaultgateError::Database { .. } => 500,
            VaultgateError::Io { .. } => 500,
            VaultgateError::Serialization { .. } => 500,
            VaultgateError::Validation { .. } => 400,
            VaultgateError::Auth { error_type, .. } => match error_type {
                AuthErrorType::MissingOrganization => 403,
                _ => 401,
            },
            VaultgateError::Denied(reason) => reason.status_code(),
            VaultgateError::Encryption { .. } => 500,
            VaultgateError::Upstream { .. } => 502,
            VaultgateError::Internal { .. } => 500,
            VaultgateError::NotFound { .. } => 404,
            VaultgateError::Conflict { .. } => 409,
            VaultgateError::Timeout { .. } => 504,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultgateError::Database { .. }
                | VaultgateError::Io { .. }
                | VaultgateError::Upstream { .. }
                | VaultgateError::Timeout { .. }
        )
    }
}

impl From<DenyReason> for VaultgateError {
    fn from(reason: DenyReason) -> Self {
        Self::Denied(reason)
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for VaultgateError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for VaultgateError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for VaultgateError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for VaultgateError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = VaultgateError::config("Test configuration error");
        assert!(matches!(error, VaultgateError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_validation_error() {
        let error = VaultgateError::validation_field("Invalid base URL", "config.baseUrl");
        assert!(matches!(error, VaultgateError::Validation { .. }));
        if let VaultgateError::Validation { field, .. } = error {
            assert_eq!(field, Some("config.baseUrl".to_string()));
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(VaultgateError::validation("test").status_code(), 400);
        assert_eq!(
            VaultgateError::auth("test", AuthErrorType::InvalidToken).status_code(),
            401
        );
        assert_eq!(
            VaultgateError::auth("test", AuthErrorType::MissingOrganization).status_code(),
            403
        );
        assert_eq!(VaultgateError::not_found("connector", "pxy_x").status_code(), 404);
        assert_eq!(VaultgateError::conflict("test", "connector").status_code(), 409);
        assert_eq!(VaultgateError::upstream("test", None).status_code(), 502);
        assert_eq!(VaultgateError::timeout("execute", 30_000).status_code(), 504);
        assert_eq!(VaultgateError::encryption("test").status_code(), 500);
    }

    #[test]
    fn test_denied_status_codes_follow_reason() {
        assert_eq!(VaultgateError::from(DenyReason::AuthRequired).status_code(), 401);
        assert_eq!(VaultgateError::from(DenyReason::RateLimited).status_code(), 429);
        assert_eq!(VaultgateError::from(DenyReason::ConnectorInactive).status_code(), 403);
        assert_eq!(VaultgateError::from(DenyReason::LinkExpired).status_code(), 403);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(VaultgateError::timeout("execute", 1000).is_retryable());
        assert!(VaultgateError::upstream("connection reset", None).is_retryable());
        assert!(!VaultgateError::validation("test").is_retryable());
        assert!(!VaultgateError::from(DenyReason::RateLimited).is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VaultgateError = io_error.into();
        assert!(matches!(err, VaultgateError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: VaultgateError = json_error.into();
        assert!(matches!(err, VaultgateError::Serialization { .. }));
    }
}
