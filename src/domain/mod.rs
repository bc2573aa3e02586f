//! Domain layer
//!
//! Pure domain entities and business logic with zero infrastructure
//! dependencies. Domain types represent the core concepts of the proxy
//! gateway: connectors hiding real credentials, shared links granting
//! scoped access, and the audit records every attempt leaves behind.
//!
//! ## Module Organization
//!
//! - `id`: Type-safe domain identifiers with NewType pattern
//! - `caller`: Identity and client metadata attached to each request
//! - `connector`: Proxy connector records and typed connection payloads
//! - `link`: Shared proxy link records
//! - `access_log`: Immutable access records and detail redaction

pub mod access_log;
pub mod caller;
pub mod connector;
pub mod id;
pub mod link;

// Re-export main types from each module
pub use access_log::{redact_details, NewAccessLogEntry, ProxyAccessLog};
pub use caller::CallerContext;
pub use connector::{
    ApiConfig, ApiCredentials, ConnectorConfig, ConnectorCredentials, ConnectorPayloadError,
    ConnectorType, DatabaseConfig, DatabaseCredentials, HeaderPair, NewProxyConnector,
    ObjectStoreConfig, ObjectStoreCredentials, ProxyConnector, DEFAULT_RATE_LIMIT,
};
pub use id::{ConnectorId, HandleParseError, LinkId, ProxyId, ShareId, VaultId, HANDLE_LEN};
pub use link::{NewSharedProxyLink, SharedProxyLink};
