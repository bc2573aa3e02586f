//! Access control evaluation
//!
//! One pure function decides whether an attempt may proceed. Rules run in
//! a fixed order and stop at the first failure, so every denial carries
//! exactly one reason and the reason is stable for identical inputs.
//! Rate limiting is the only stateful rule; it lives in
//! [`rate_limit`] and runs after the pure rules pass.

mod rate_limit;

pub use rate_limit::FixedWindowLimiter;

use crate::domain::{CallerContext, ProxyConnector, SharedProxyLink};
use chrono::{DateTime, Utc};
use std::fmt;

/// Why an access attempt was refused.
///
/// Variants are ordered the way the rules run; the first failing rule
/// names the denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The connector was deactivated
    ConnectorInactive,
    /// The link is inactive or past its expiry instant
    LinkExpired,
    /// The link's use budget is spent
    UsesExhausted,
    /// An identity is required and the caller has none
    AuthRequired,
    /// The link names specific users and the caller is not one of them
    UserNotAllowed,
    /// The link names e-mail domains and the caller's does not match
    DomainNotAllowed,
    /// The operation is outside the connector's allowed set
    OperationNotAllowed,
    /// Too many requests against this proxy in the current window
    RateLimited,
}

impl DenyReason {
    /// Stable reason code used in responses and access logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectorInactive => "connector_inactive",
            Self::LinkExpired => "link_expired",
            Self::UsesExhausted => "uses_exhausted",
            Self::AuthRequired => "auth_required",
            Self::UserNotAllowed => "user_not_allowed",
            Self::DomainNotAllowed => "domain_not_allowed",
            Self::OperationNotAllowed => "operation_not_allowed",
            Self::RateLimited => "rate_limited",
        }
    }

    /// HTTP status a denial surfaces as
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthRequired => 401,
            Self::RateLimited => 429,
            _ => 403,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the pure rules look at for one attempt
#[derive(Debug)]
pub struct AccessRequest<'a> {
    pub connector: &'a ProxyConnector,
    /// Present when the caller arrived through a shared link
    pub link: Option<&'a SharedProxyLink>,
    pub caller: &'a CallerContext,
    pub operation: &'a str,
    pub now: DateTime<Utc>,
}

/// Evaluate the ordered access rules for one attempt.
///
/// Returns the first failing rule's reason. Rate limiting is not part of
/// this function; the gateway applies it after these rules pass.
///
/// With a link present, the link's `requires_authentication` flag decides
/// whether an identity is needed; without one, the connector's `is_public`
/// flag does. Anonymous access to a private connector through a link is
/// exactly what links are for.
pub fn evaluate(request: &AccessRequest<'_>) -> Result<(), DenyReason> {
    if !request.connector.is_active {
        return Err(DenyReason::ConnectorInactive);
    }

    if let Some(link) = request.link {
        if !link.is_active || link.is_expired(request.now) {
            return Err(DenyReason::LinkExpired);
        }
        if link.uses_exhausted() {
            return Err(DenyReason::UsesExhausted);
        }
    }

    let needs_auth = match request.link {
        Some(link) => link.requires_authentication,
        None => !request.connector.is_public,
    };
    if needs_auth && !request.caller.is_authenticated() {
        return Err(DenyReason::AuthRequired);
    }

    if let Some(link) = request.link {
        if !link.allowed_users.is_empty()
            && !link.allowed_users.iter().any(|entry| request.caller.matches_identity(entry))
        {
            return Err(DenyReason::UserNotAllowed);
        }

        if !link.allowed_domains.is_empty() {
            let domain_matches = request
                .caller
                .email_domain()
                .map(|domain| {
                    link.allowed_domains.iter().any(|allowed| allowed.eq_ignore_ascii_case(domain))
                })
                .unwrap_or(false);
            if !domain_matches {
                return Err(DenyReason::DomainNotAllowed);
            }
        }
    }

    if !request.connector.allows_operation(request.operation) {
        return Err(DenyReason::OperationNotAllowed);
    }

    Ok(())
}
