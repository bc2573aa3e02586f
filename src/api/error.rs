use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::{AuthErrorType, VaultgateError};
use crate::storage::is_unique_violation;

/// Error surface of the management API. Gateway endpoints build their
/// responses inside the pipeline instead, so denial bodies and the audit
/// trail always agree.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let error_kind = match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal_error",
        };

        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg,
        };

        (status, Json(ErrorBody { error: error_kind, message })).into_response()
    }
}

impl From<VaultgateError> for ApiError {
    fn from(err: VaultgateError) -> Self {
        match err {
            VaultgateError::Validation { message, field } => {
                let message = match field {
                    Some(field) => format!("{} (field: {})", message, field),
                    None => message,
                };
                ApiError::BadRequest(message)
            }
            VaultgateError::NotFound { resource_type, id } => {
                ApiError::NotFound(format!("{} '{}' not found", resource_type, id))
            }
            VaultgateError::Auth { message, error_type } => match error_type {
                AuthErrorType::MissingOrganization => ApiError::Forbidden(message),
                _ => ApiError::Unauthorized(message),
            },
            VaultgateError::Conflict { message, .. } => ApiError::Conflict(message),
            VaultgateError::Denied(reason) => match reason.status_code() {
                401 => ApiError::Unauthorized(reason.to_string()),
                _ => ApiError::Forbidden(reason.to_string()),
            },
            VaultgateError::Database { source, context } => {
                if is_unique_violation(&source) {
                    ApiError::Conflict(context)
                } else {
                    ApiError::Internal(context)
                }
            }
            // Internal detail stays in the logs; callers get the category
            VaultgateError::Encryption { .. } => {
                ApiError::Internal("Credential vault operation failed".to_string())
            }
            VaultgateError::Config { message, .. } => ApiError::Internal(message),
            VaultgateError::Upstream { message, .. } => ApiError::Internal(message),
            VaultgateError::Timeout { operation, duration_ms } => {
                ApiError::Internal(format!("{} timed out after {}ms", operation, duration_ms))
            }
            VaultgateError::Io { context, .. } | VaultgateError::Serialization { context, .. } => {
                ApiError::Internal(context)
            }
            VaultgateError::Internal { message, .. } => ApiError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DenyReason;

    #[test]
    fn validation_maps_to_bad_request() {
        let api_err = ApiError::from(VaultgateError::validation_field("must not be empty", "name"));
        assert!(matches!(api_err, ApiError::BadRequest(_)));
        if let ApiError::BadRequest(msg) = api_err {
            assert!(msg.contains("name"));
        }
    }

    #[test]
    fn not_found_keeps_resource_wording() {
        let api_err = ApiError::from(VaultgateError::not_found("proxy_connector", "pxy_abc"));
        if let ApiError::NotFound(msg) = api_err {
            assert_eq!(msg, "proxy_connector 'pxy_abc' not found");
        } else {
            panic!("expected NotFound");
        }
    }

    #[test]
    fn missing_organization_is_forbidden() {
        let api_err = ApiError::from(VaultgateError::auth(
            "An organization is required",
            AuthErrorType::MissingOrganization,
        ));
        assert!(matches!(api_err, ApiError::Forbidden(_)));

        let api_err =
            ApiError::from(VaultgateError::auth("Sign in first", AuthErrorType::MissingIdentity));
        assert!(matches!(api_err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn denied_follows_reason_status() {
        assert!(matches!(
            ApiError::from(VaultgateError::Denied(DenyReason::AuthRequired)),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(
            ApiError::from(VaultgateError::Denied(DenyReason::OperationNotAllowed)),
            ApiError::Forbidden(_)
        ));
    }

    #[test]
    fn encryption_failures_stay_generic() {
        let api_err = ApiError::from(VaultgateError::encryption("aead open failed for key v2"));
        if let ApiError::Internal(msg) = api_err {
            assert!(!msg.contains("key"));
        } else {
            panic!("expected Internal");
        }
    }
}
