use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{
    CallerContext, ConnectorConfig, ConnectorCredentials, ProxyAccessLog, ProxyConnector,
};
use crate::errors::VaultgateError;
use crate::services::{ConnectorAnalytics, CreateConnectorInput, CreatedConnector};
use crate::storage::AccessLogStats;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "name": "billing-api",
    "description": "Internal billing service",
    "config": {
        "type": "api",
        "payload": {"base_url": "https://billing.internal.example.com"}
    },
    "credentials": {
        "type": "api",
        "payload": {"scheme": "bearer", "token": "upstream-service-token"}
    },
    "isPublic": false,
    "allowedOperations": ["read"],
    "rateLimit": 50
}))]
pub struct CreateConnectorBody {
    /// Display name for the connector.
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "billing-api")]
    pub name: String,

    /// Optional free-form description.
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: Option<String>,

    /// Typed connection configuration; its tag decides the connector type.
    pub config: ConnectorConfig,

    /// Credential material, vaulted on creation and never returned.
    pub credentials: ConnectorCredentials,

    /// Whether anonymous callers may use the proxy identity (default: false).
    #[serde(default)]
    #[schema(default = false)]
    pub is_public: bool,

    /// Operation allow-list; empty selects the connector-type default set.
    #[serde(default)]
    pub allowed_operations: Vec<String>,

    /// Requests per rate-limit window (default: 100).
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

/// Non-secret projection of a connector. The vault reference and the
/// access-token hash never leave the service.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "0d7f5b2a-4a7e-4f68-9d35-2f4a70c7a2bd",
    "proxyId": "pxy_k3J9mQ2xL8aB4cD6eF1gH5iZ",
    "name": "billing-api",
    "description": "Internal billing service",
    "connectorType": "api",
    "isPublic": false,
    "allowedOperations": ["read"],
    "rateLimit": 50,
    "organizationId": "org-1",
    "createdBy": "user-1",
    "isActive": true,
    "totalRequests": 0
}))]
pub struct ConnectorResponse {
    pub id: String,
    pub proxy_id: String,
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "api")]
    pub connector_type: String,
    pub is_public: bool,
    /// Effective operation set, with type defaults substituted for an empty
    /// allow-list.
    pub allowed_operations: Vec<String>,
    pub rate_limit: u32,
    pub organization_id: String,
    pub created_by: String,
    pub is_active: bool,
    pub total_requests: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectorResponse {
    pub(crate) fn from_domain(connector: &ProxyConnector) -> Self {
        let allowed_operations = if connector.allowed_operations.is_empty() {
            connector
                .connector_type
                .default_operations()
                .iter()
                .map(|operation| operation.to_string())
                .collect()
        } else {
            connector.allowed_operations.clone()
        };

        Self {
            id: connector.id.to_string(),
            proxy_id: connector.proxy_id.to_string(),
            name: connector.name.clone(),
            description: connector.description.clone(),
            connector_type: connector.connector_type.as_str().to_string(),
            is_public: connector.is_public,
            allowed_operations,
            rate_limit: connector.rate_limit,
            organization_id: connector.organization_id.clone(),
            created_by: connector.created_by.clone(),
            is_active: connector.is_active,
            total_requests: connector.total_requests,
            last_accessed_at: connector.last_accessed_at,
            created_at: connector.created_at,
            updated_at: connector.updated_at,
        }
    }
}

/// Creation and rotation response. `accessToken` is shown exactly once.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedConnectorResponse {
    pub connector: ConnectorResponse,
    /// Connector access token; store it now, it is never shown again.
    #[schema(example = "vgc_0d7f5b2a-4a7e-4f68-9d35-2f4a70c7a2bd.mX2...")]
    pub access_token: String,
    /// Public URL callers use to reach the proxy identity.
    pub proxy_url: String,
}

impl CreatedConnectorResponse {
    fn from_created(created: CreatedConnector) -> Self {
        Self {
            connector: ConnectorResponse::from_domain(&created.connector),
            access_token: created.access_token,
            proxy_url: created.proxy_url,
        }
    }
}

/// Aggregate counters over a connector's audit trail.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogStatsResponse {
    pub total: i64,
    pub allowed: i64,
    pub denied: i64,
    pub failed: i64,
}

impl From<AccessLogStats> for AccessLogStatsResponse {
    fn from(stats: AccessLogStats) -> Self {
        Self {
            total: stats.total,
            allowed: stats.allowed,
            denied: stats.denied,
            failed: stats.failed,
        }
    }
}

/// One access-log row as shown to the connector owner. Operation details
/// were redacted before they were persisted.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntryResponse {
    pub id: i64,
    pub shared_link_id: Option<String>,
    pub user_id: Option<String>,
    pub user_ip: String,
    pub user_agent: Option<String>,
    pub operation_type: String,
    #[schema(value_type = Object)]
    pub operation_details: Value,
    pub status_code: u16,
    pub response_size: i64,
    pub execution_time_ms: i64,
    pub accessed_at: DateTime<Utc>,
}

impl From<ProxyAccessLog> for AccessLogEntryResponse {
    fn from(entry: ProxyAccessLog) -> Self {
        Self {
            id: entry.id,
            shared_link_id: entry.shared_link_id.map(|id| id.to_string()),
            user_id: entry.user_id,
            user_ip: entry.user_ip,
            user_agent: entry.user_agent,
            operation_type: entry.operation_type,
            operation_details: entry.operation_details,
            status_code: entry.status_code,
            response_size: entry.response_size,
            execution_time_ms: entry.execution_time_ms,
            accessed_at: entry.accessed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorAnalyticsResponse {
    pub connector: ConnectorResponse,
    pub stats: AccessLogStatsResponse,
    pub recent: Vec<AccessLogEntryResponse>,
}

impl ConnectorAnalyticsResponse {
    fn from_analytics(analytics: ConnectorAnalytics) -> Self {
        Self {
            connector: ConnectorResponse::from_domain(&analytics.connector),
            stats: analytics.stats.into(),
            recent: analytics.recent.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/connectors",
    request_body = CreateConnectorBody,
    responses(
        (status = 201, description = "Connector created; access token shown once", body = CreatedConnectorResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Caller is not authenticated"),
        (status = 403, description = "Caller has no organization"),
    ),
    tag = "connectors"
)]
pub async fn create_connector_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Json(payload): Json<CreateConnectorBody>,
) -> Result<(StatusCode, Json<CreatedConnectorResponse>), ApiError> {
    payload.validate().map_err(|err| ApiError::from(VaultgateError::from(err)))?;

    let created = state
        .connectors
        .create_connector(
            &caller,
            CreateConnectorInput {
                name: payload.name,
                description: payload.description,
                config: payload.config,
                credentials: payload.credentials,
                is_public: payload.is_public,
                allowed_operations: payload.allowed_operations,
                rate_limit: payload.rate_limit,
            },
        )
        .await
        .map_err(ApiError::from)?;

    Ok((StatusCode::CREATED, Json(CreatedConnectorResponse::from_created(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/connectors",
    responses(
        (status = 200, description = "Connectors in the caller's organization", body = [ConnectorResponse]),
        (status = 403, description = "Caller has no organization"),
    ),
    tag = "connectors"
)]
pub async fn list_connectors_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
) -> Result<Json<Vec<ConnectorResponse>>, ApiError> {
    let connectors = state.connectors.list_connectors(&caller).await.map_err(ApiError::from)?;
    Ok(Json(connectors.iter().map(ConnectorResponse::from_domain).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/connectors/{proxy_id}",
    params(("proxy_id" = String, Path, description = "Opaque proxy identity")),
    responses(
        (status = 200, description = "Connector details", body = ConnectorResponse),
        (status = 404, description = "No such connector in the caller's organization"),
    ),
    tag = "connectors"
)]
pub async fn get_connector_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Path(proxy_id): Path<String>,
) -> Result<Json<ConnectorResponse>, ApiError> {
    let connector =
        state.connectors.get_connector(&caller, &proxy_id).await.map_err(ApiError::from)?;
    Ok(Json(ConnectorResponse::from_domain(&connector)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/connectors/{proxy_id}",
    params(("proxy_id" = String, Path, description = "Opaque proxy identity")),
    responses(
        (status = 204, description = "Connector deactivated (idempotent)"),
        (status = 404, description = "No such connector in the caller's organization"),
    ),
    tag = "connectors"
)]
pub async fn deactivate_connector_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Path(proxy_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.connectors.deactivate_connector(&caller, &proxy_id).await.map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/connectors/{proxy_id}/rotate-token",
    params(("proxy_id" = String, Path, description = "Opaque proxy identity")),
    responses(
        (status = 200, description = "New access token issued; the old one stops verifying", body = CreatedConnectorResponse),
        (status = 404, description = "No such connector in the caller's organization"),
    ),
    tag = "connectors"
)]
pub async fn rotate_connector_token_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Path(proxy_id): Path<String>,
) -> Result<Json<CreatedConnectorResponse>, ApiError> {
    let rotated =
        state.connectors.rotate_access_token(&caller, &proxy_id).await.map_err(ApiError::from)?;
    Ok(Json(CreatedConnectorResponse::from_created(rotated)))
}

#[utoipa::path(
    get,
    path = "/api/v1/connectors/{proxy_id}/analytics",
    params(
        ("proxy_id" = String, Path, description = "Opaque proxy identity"),
        ("limit" = Option<i64>, Query, description = "Recent entries to return (default 50, max 500)"),
    ),
    responses(
        (status = 200, description = "Usage stats and recent access-log entries", body = ConnectorAnalyticsResponse),
        (status = 404, description = "No such connector in the caller's organization"),
    ),
    tag = "connectors"
)]
pub async fn connector_analytics_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Path(proxy_id): Path<String>,
    Query(params): Query<AnalyticsQuery>,
) -> Result<Json<ConnectorAnalyticsResponse>, ApiError> {
    let analytics = state
        .connectors
        .connector_analytics(&caller, &proxy_id, params.limit)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ConnectorAnalyticsResponse::from_analytics(analytics)))
}
