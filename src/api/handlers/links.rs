use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{CallerContext, SharedProxyLink};
use crate::errors::VaultgateError;
use crate::services::{CreateLinkInput, CreatedLink};

use crate::api::error::ApiError;
use crate::api::routes::ApiState;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "proxyId": "pxy_k3J9mQ2xL8aB4cD6eF1gH5iZ",
    "name": "partner read access",
    "description": "Read-only access for the reporting partner",
    "requiresAuthentication": true,
    "allowedDomains": ["partner.example.com"],
    "expiresInHours": 72,
    "maxUses": 100
}))]
pub struct CreateLinkBody {
    /// Proxy identity of the connector to share.
    #[validate(length(min = 1))]
    pub proxy_id: String,

    /// Display name shown to link visitors.
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    /// Optional description shown to link visitors.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: Option<String>,

    /// Whether the link appears in public listings (access rules ignore it).
    #[serde(default)]
    #[schema(default = false)]
    pub is_public: bool,

    /// Require an authenticated caller even when allow-lists are empty.
    #[serde(default)]
    #[schema(default = false)]
    pub requires_authentication: bool,

    /// User ids or e-mail addresses allowed through; empty = unrestricted.
    #[serde(default)]
    pub allowed_users: Vec<String>,

    /// E-mail domains allowed through; empty = unrestricted.
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Lifetime in hours from creation; absent = never expires.
    #[serde(default)]
    #[schema(example = 72)]
    pub expires_in_hours: Option<i64>,

    /// Total number of grants before the link exhausts; absent = unlimited.
    #[serde(default)]
    #[schema(example = 100)]
    pub max_uses: Option<i64>,
}

/// A shared link as returned to its creator.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "8c1f7e9b-53d2-47ab-9f00-6f0b3f2d9e11",
    "shareId": "shr_p7Q2wE9rT4yU6iO1aS3dF5gH",
    "connectorId": "0d7f5b2a-4a7e-4f68-9d35-2f4a70c7a2bd",
    "name": "partner read access",
    "requiresAuthentication": true,
    "allowedDomains": ["partner.example.com"],
    "maxUses": 100,
    "currentUses": 0,
    "isActive": true
}))]
pub struct LinkResponse {
    pub id: String,
    pub share_id: String,
    pub connector_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub requires_authentication: bool,
    pub allowed_users: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkResponse {
    pub(crate) fn from_domain(link: &SharedProxyLink) -> Self {
        Self {
            id: link.id.to_string(),
            share_id: link.share_id.to_string(),
            connector_id: link.connector_id.to_string(),
            name: link.name.clone(),
            description: link.description.clone(),
            is_public: link.is_public,
            requires_authentication: link.requires_authentication,
            allowed_users: link.allowed_users.clone(),
            allowed_domains: link.allowed_domains.clone(),
            expires_at: link.expires_at,
            max_uses: link.max_uses,
            current_uses: link.current_uses,
            created_by: link.created_by.clone(),
            is_active: link.is_active,
            created_at: link.created_at,
            updated_at: link.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedLinkResponse {
    pub link: LinkResponse,
    /// Public URL visitors open to use the shared link.
    pub public_url: String,
}

impl CreatedLinkResponse {
    fn from_created(created: CreatedLink) -> Self {
        Self { link: LinkResponse::from_domain(&created.link), public_url: created.public_url }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/links",
    request_body = CreateLinkBody,
    responses(
        (status = 201, description = "Shared link created", body = CreatedLinkResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Caller is not authenticated"),
        (status = 404, description = "No such connector in the caller's organization"),
    ),
    tag = "links"
)]
pub async fn create_link_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Json(payload): Json<CreateLinkBody>,
) -> Result<(StatusCode, Json<CreatedLinkResponse>), ApiError> {
    payload.validate().map_err(|err| ApiError::from(VaultgateError::from(err)))?;

    let created = state
        .links
        .create_link(
            &caller,
            CreateLinkInput {
                proxy_id: payload.proxy_id,
                name: payload.name,
                description: payload.description,
                is_public: payload.is_public,
                requires_authentication: payload.requires_authentication,
                allowed_users: payload.allowed_users,
                allowed_domains: payload.allowed_domains,
                expires_in_hours: payload.expires_in_hours,
                max_uses: payload.max_uses,
            },
        )
        .await
        .map_err(ApiError::from)?;

    Ok((StatusCode::CREATED, Json(CreatedLinkResponse::from_created(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/links",
    responses(
        (status = 200, description = "Links created by the caller, newest first", body = [LinkResponse]),
        (status = 401, description = "Caller is not authenticated"),
    ),
    tag = "links"
)]
pub async fn list_links_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
) -> Result<Json<Vec<LinkResponse>>, ApiError> {
    let links = state.links.list_links(&caller).await.map_err(ApiError::from)?;
    Ok(Json(links.iter().map(LinkResponse::from_domain).collect()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/links/{share_id}",
    params(("share_id" = String, Path, description = "Opaque share identity")),
    responses(
        (status = 204, description = "Link deactivated (idempotent)"),
        (status = 404, description = "No such link created by the caller"),
    ),
    tag = "links"
)]
pub async fn deactivate_link_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Path(share_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.links.deactivate_link(&caller, &share_id).await.map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
