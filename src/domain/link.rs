//! Shared proxy link domain types
//!
//! A shared link is a scoped grant derived from one proxy connector: same
//! underlying connection, narrower audience. Links never widen what the
//! connector allows; they only add expiry, use counting and allow-lists on
//! top.

use chrono::{DateTime, Utc};

use super::id::{ConnectorId, LinkId, ShareId};

/// A shareable access grant as stored in the registry
#[derive(Debug, Clone)]
pub struct SharedProxyLink {
    pub id: LinkId,
    pub share_id: ShareId,
    pub connector_id: ConnectorId,
    pub name: String,
    pub description: Option<String>,
    /// Listing visibility only; access rules never consult this flag
    pub is_public: bool,
    pub requires_authentication: bool,
    /// User ids or e-mail addresses; empty means unrestricted
    pub allowed_users: Vec<String>,
    /// E-mail domains; empty means unrestricted
    pub allowed_domains: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// None means unlimited
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SharedProxyLink {
    /// Whether the link has passed its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expires_at| expires_at <= now).unwrap_or(false)
    }

    /// Whether the use budget is spent. Always false for unlimited links.
    pub fn uses_exhausted(&self) -> bool {
        self.max_uses.map(|max_uses| self.current_uses >= max_uses).unwrap_or(false)
    }
}

/// Insert payload for a new shared proxy link
#[derive(Debug, Clone)]
pub struct NewSharedProxyLink {
    pub connector_id: ConnectorId,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub requires_authentication: bool,
    pub allowed_users: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub created_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_link() -> SharedProxyLink {
        SharedProxyLink {
            id: LinkId::new(),
            share_id: ShareId::generate(),
            connector_id: ConnectorId::new(),
            name: "partner-access".to_string(),
            description: None,
            is_public: false,
            requires_authentication: false,
            allowed_users: vec![],
            allowed_domains: vec![],
            expires_at: None,
            max_uses: None,
            current_uses: 0,
            created_by: "user-1".to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn link_without_expiry_never_expires() {
        let link = sample_link();
        assert!(!link.is_expired(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn link_expiry_is_inclusive_at_the_boundary() {
        let now = Utc::now();
        let link = SharedProxyLink { expires_at: Some(now), ..sample_link() };
        assert!(link.is_expired(now));
        assert!(!link.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn unlimited_links_never_exhaust() {
        let link = SharedProxyLink { current_uses: 1_000_000, ..sample_link() };
        assert!(!link.uses_exhausted());
    }

    #[test]
    fn uses_exhausted_at_max() {
        let link = SharedProxyLink { max_uses: Some(3), current_uses: 3, ..sample_link() };
        assert!(link.uses_exhausted());

        let link = SharedProxyLink { max_uses: Some(3), current_uses: 2, ..sample_link() };
        assert!(!link.uses_exhausted());
    }
}
