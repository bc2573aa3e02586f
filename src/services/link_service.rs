//! Business logic for shared proxy links.
//!
//! A shared link grants scoped access to someone else's connector without
//! revealing the proxy identity or any credentials. Links narrow, never
//! widen: expiry, usage caps, and allow-lists are enforced by the access
//! rules at request time, while this service owns creation and lifecycle.

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use crate::domain::{
    CallerContext, LinkId, NewSharedProxyLink, ProxyId, ShareId, SharedProxyLink,
};
use crate::errors::{Result, VaultgateError};
use crate::storage::{is_unique_violation, ConnectorRepository, DbPool, LinkRepository};

const MAX_HANDLE_ATTEMPTS: u32 = 3;

/// Everything needed to create a shared link for an owned connector.
#[derive(Debug, Clone)]
pub struct CreateLinkInput {
    /// Public handle of the connector being shared
    pub proxy_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub requires_authentication: bool,
    pub allowed_users: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub expires_in_hours: Option<i64>,
    pub max_uses: Option<i64>,
}

/// A freshly created link together with its shareable URL.
#[derive(Debug, Clone)]
pub struct CreatedLink {
    pub link: SharedProxyLink,
    pub public_url: String,
}

#[derive(Clone)]
pub struct LinkService {
    links: LinkRepository,
    connectors: ConnectorRepository,
    public_url: String,
}

impl LinkService {
    pub fn new(pool: DbPool, public_url: impl Into<String>) -> Self {
        Self {
            links: LinkRepository::new(pool.clone()),
            connectors: ConnectorRepository::new(pool),
            public_url: public_url.into(),
        }
    }

    /// Create a shared link for a connector owned by the caller's
    /// organization.
    #[instrument(skip(self, caller, input), fields(link_name = %input.name), name = "create_link")]
    pub async fn create_link(
        &self,
        caller: &CallerContext,
        input: CreateLinkInput,
    ) -> Result<CreatedLink> {
        let organization_id = caller.require_organization()?;
        let created_by = caller.require_user()?.to_string();

        let connector = self.resolve_owned_connector(organization_id, &input.proxy_id).await?;
        if !connector.is_active {
            return Err(VaultgateError::validation(
                "Cannot create a shared link for an inactive connector",
            ));
        }

        if input.name.trim().is_empty() {
            return Err(VaultgateError::validation_field("Link name must not be empty", "name"));
        }
        if let Some(hours) = input.expires_in_hours {
            if hours <= 0 {
                return Err(VaultgateError::validation_field(
                    "Expiry must be a positive number of hours",
                    "expiresInHours",
                ));
            }
        }
        if let Some(max_uses) = input.max_uses {
            if max_uses <= 0 {
                return Err(VaultgateError::validation_field(
                    "Maximum uses must be greater than zero",
                    "maxUses",
                ));
            }
        }

        let expires_at = input.expires_in_hours.map(|hours| Utc::now() + Duration::hours(hours));
        let new = NewSharedProxyLink {
            connector_id: connector.id.clone(),
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            is_public: input.is_public,
            requires_authentication: input.requires_authentication,
            allowed_users: normalize_entries(&input.allowed_users),
            allowed_domains: normalize_entries(&input.allowed_domains),
            expires_at,
            max_uses: input.max_uses,
            created_by,
        };

        let mut attempts = 0;
        let link = loop {
            attempts += 1;
            let link_id = LinkId::new();
            let share_id = ShareId::generate();
            match self.links.create(&link_id, &share_id, &new).await {
                Ok(link) => break link,
                Err(VaultgateError::Database { ref source, .. })
                    if is_unique_violation(source) && attempts < MAX_HANDLE_ATTEMPTS =>
                {
                    warn!(attempt = attempts, "Share handle collision, regenerating");
                    continue;
                }
                Err(err) => return Err(err),
            }
        };

        info!(
            link_id = %link.id,
            share_id = %link.share_id,
            connector_id = %connector.id,
            "Shared proxy link created"
        );

        Ok(CreatedLink { public_url: self.share_url(&link.share_id), link })
    }

    /// Links created by the caller, newest first.
    pub async fn list_links(&self, caller: &CallerContext) -> Result<Vec<SharedProxyLink>> {
        let created_by = caller.require_user()?;
        self.links.list_by_creator(created_by).await
    }

    /// Deactivate one of the caller's links. Idempotent once deactivated;
    /// links created by others are reported as absent.
    #[instrument(skip(self, caller), name = "deactivate_link")]
    pub async fn deactivate_link(&self, caller: &CallerContext, share_handle: &str) -> Result<()> {
        let created_by = caller.require_user()?;
        let share_id = ShareId::parse(share_handle)
            .map_err(|_| VaultgateError::not_found("shared_link", share_handle))?;
        let link = self
            .links
            .find_by_share_id(&share_id)
            .await?
            .filter(|link| link.created_by == created_by)
            .ok_or_else(|| VaultgateError::not_found("shared_link", share_handle))?;

        if self.links.deactivate(&link.id).await? {
            info!(link_id = %link.id, share_id = %link.share_id, "Shared link deactivated");
        }
        Ok(())
    }

    async fn resolve_owned_connector(
        &self,
        organization_id: &str,
        proxy_handle: &str,
    ) -> Result<crate::domain::ProxyConnector> {
        let proxy_id = ProxyId::parse(proxy_handle)
            .map_err(|_| VaultgateError::not_found("proxy_connector", proxy_handle))?;
        self.connectors
            .find_by_proxy_id(&proxy_id)
            .await?
            .filter(|connector| connector.organization_id == organization_id)
            .ok_or_else(|| VaultgateError::not_found("proxy_connector", proxy_handle))
    }

    fn share_url(&self, share_id: &ShareId) -> String {
        format!("{}/share/{}", self.public_url.trim_end_matches('/'), share_id)
    }
}

impl std::fmt::Debug for LinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService").field("public_url", &self.public_url).finish()
    }
}

fn normalize_entries(entries: &[String]) -> Vec<String> {
    entries.iter().map(|e| e.trim().to_string()).filter(|e| !e.is_empty()).collect()
}
