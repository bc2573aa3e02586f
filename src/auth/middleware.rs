//! Axum middleware for caller identity resolution.
//!
//! Identity arrives as trusted headers set by the platform's auth layer in
//! front of this service. The middleware never rejects: an absent identity
//! produces an anonymous [`CallerContext`] and the access rules decide what
//! anonymous callers may do.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::domain::CallerContext;

/// Header carrying the authenticated user id
pub const USER_HEADER: &str = "x-auth-user";
/// Header carrying the authenticated user's e-mail
pub const EMAIL_HEADER: &str = "x-auth-email";
/// Header carrying the user's organization id
pub const ORG_HEADER: &str = "x-auth-org";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Build a [`CallerContext`] from request headers.
///
/// The client IP is the first entry of `x-forwarded-for`; a request with
/// no forwarding chain is recorded as coming from "unknown".
pub fn caller_from_headers(headers: &HeaderMap) -> CallerContext {
    let ip = header_value(headers, "x-forwarded-for")
        .and_then(|chain| chain.split(',').next().map(|first| first.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    CallerContext {
        user_id: header_value(headers, USER_HEADER),
        email: header_value(headers, EMAIL_HEADER),
        organization_id: header_value(headers, ORG_HEADER),
        ip,
        user_agent: header_value(headers, "user-agent"),
    }
}

/// Middleware entry point that attaches the resolved caller to the request.
pub async fn resolve_caller(mut request: Request<Body>, next: Next) -> Response {
    let caller = caller_from_headers(request.headers());
    request.extensions_mut().insert(caller);
    next.run(request).await
}
