//! Caller identity and client metadata
//!
//! Identity is established upstream (platform auth gateway or a connector
//! access token) and handed to every layer below HTTP as an explicit
//! [`CallerContext`]. Anonymous callers are first-class: they carry client
//! metadata but no identity, and the access rules decide what they may do.

use crate::errors::{AuthErrorType, Result, VaultgateError};

/// Who is calling, and from where.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub organization_id: Option<String>,
    pub ip: String,
    pub user_agent: Option<String>,
}

impl CallerContext {
    /// A caller with no identity, only client metadata.
    pub fn anonymous(ip: impl Into<String>, user_agent: Option<String>) -> Self {
        Self { user_id: None, email: None, organization_id: None, ip: ip.into(), user_agent }
    }

    /// Whether any identity was established for this caller.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Domain part of the caller's e-mail address, if one is known.
    pub fn email_domain(&self) -> Option<&str> {
        self.email.as_deref().and_then(|email| email.rsplit_once('@')).map(|(_, domain)| domain)
    }

    /// Whether an allow-list entry names this caller, by user id (exact) or
    /// e-mail address (case-insensitive).
    pub fn matches_identity(&self, entry: &str) -> bool {
        if let Some(user_id) = self.user_id.as_deref() {
            if user_id == entry {
                return true;
            }
        }
        if let Some(email) = self.email.as_deref() {
            if email.eq_ignore_ascii_case(entry) {
                return true;
            }
        }
        false
    }

    /// The caller's organization, required for management operations.
    pub fn require_organization(&self) -> Result<&str> {
        self.organization_id.as_deref().ok_or_else(|| {
            VaultgateError::auth(
                "This operation requires an organization context",
                AuthErrorType::MissingOrganization,
            )
        })
    }

    /// The caller's user id, required for operations that record ownership.
    pub fn require_user(&self) -> Result<&str> {
        self.user_id.as_deref().ok_or_else(|| {
            VaultgateError::auth(
                "This operation requires an authenticated caller",
                AuthErrorType::MissingIdentity,
            )
        })
    }
}
