//! Gateway-path handlers: proxied execution and shared-link access.
//!
//! These endpoints do not use [`ApiError`](crate::api::error::ApiError).
//! The pipeline decides status and body together with the audit row, and
//! the handlers return both verbatim.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::CallerContext;
use crate::services::GatewayResponse;

use crate::api::routes::ApiState;

/// Operation request accepted by the proxy execution endpoint.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "operationType": "read",
    "operationData": {"path": "/v1/invoices", "query": {"status": "open"}}
}))]
pub struct ExecuteOperationBody {
    /// Operation to run against the hidden upstream.
    #[schema(example = "read")]
    pub operation_type: String,

    /// Operation parameters; shape depends on the connector type.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub operation_data: Value,
}

/// Connector access token from `Authorization: Bearer vgc_...`, when one
/// is presented. Other authorization schemes are ignored here; identity
/// headers already produced the caller context.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// The upstream status passes through unchanged and may fall outside the
/// range `StatusCode` accepts; anything unrepresentable becomes a 500.
fn gateway_response(response: GatewayResponse) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(response.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body))
}

#[utoipa::path(
    post,
    path = "/proxy/{proxy_id}/execute",
    params(("proxy_id" = String, Path, description = "Opaque proxy identity")),
    request_body = ExecuteOperationBody,
    responses(
        (status = 200, description = "Operation executed; upstream status passes through"),
        (status = 401, description = "Authentication required or bad connector token"),
        (status = 403, description = "Denied by access rules"),
        (status = 404, description = "Unknown proxy identity"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 504, description = "Upstream dispatch timed out"),
    ),
    tag = "proxy"
)]
pub async fn execute_proxy_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Path(proxy_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ExecuteOperationBody>,
) -> (StatusCode, Json<Value>) {
    let token = bearer_token(&headers);
    let response = state
        .gateway
        .execute_via_proxy(
            &caller,
            &proxy_id,
            token.as_deref(),
            &payload.operation_type,
            payload.operation_data,
        )
        .await;
    gateway_response(response)
}

#[utoipa::path(
    get,
    path = "/share/{share_id}",
    params(("share_id" = String, Path, description = "Opaque share identity")),
    responses(
        (status = 200, description = "Read executed; response wrapped with link metadata"),
        (status = 401, description = "Link requires authentication"),
        (status = 403, description = "Denied by access rules, expired, or exhausted"),
        (status = 404, description = "Unknown share identity"),
        (status = 429, description = "Rate limit exceeded"),
    ),
    tag = "proxy"
)]
pub async fn access_share_handler(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerContext>,
    Path(share_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let response = state.gateway.access_via_share(&caller, &share_id).await;
    gateway_response(response)
}
