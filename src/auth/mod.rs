//! Authentication primitives
//!
//! Two concerns live here: resolving the caller identity handed down by
//! the platform's auth layer, and the connector access tokens owners use
//! for privileged gateway calls.

mod hashing;
mod middleware;
mod tokens;

pub use middleware::{caller_from_headers, resolve_caller, EMAIL_HEADER, ORG_HEADER, USER_HEADER};
pub use tokens::{
    format_access_token, parse_access_token, AccessTokenService, ACCESS_TOKEN_PREFIX,
};
