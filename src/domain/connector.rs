//! Proxy connector domain types
//!
//! A proxy connector hides one real external connection (an HTTP API, a
//! database, an object store) behind an opaque proxy id. The real
//! configuration and secret material are carried by the typed payloads in
//! this module only on their way into the credential vault; the persisted
//! connector record holds a vault reference, never plaintext.
//!
//! ## Payload envelope
//!
//! Connection payloads use a tagged envelope so every connector type is an
//! explicit variant instead of a free-form dictionary:
//!
//! ```json
//! { "type": "api", "payload": { "base_url": "https://upstream.example" } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use utoipa::ToSchema;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::id::{ConnectorId, ProxyId, VaultId};

/// Requests per rate-limit window when the owner does not set a limit.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Connector type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    /// HTTP API upstream
    Api,
    /// SQL database
    Database,
    /// S3-style object store
    ObjectStore,
}

impl ConnectorType {
    /// Get the database representation of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Database => "database",
            Self::ObjectStore => "object_store",
        }
    }

    /// Operations permitted when a connector does not configure an explicit
    /// allow-list.
    pub fn default_operations(&self) -> &'static [&'static str] {
        match self {
            Self::Api => &["read", "write"],
            Self::Database => &["read", "write"],
            Self::ObjectStore => &["read", "write", "list", "delete"],
        }
    }
}

impl FromStr for ConnectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "database" => Ok(Self::Database),
            "object_store" => Ok(Self::ObjectStore),
            _ => Err(format!("Unknown connector type: {}", s)),
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One extra header attached to upstream API calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

/// HTTP API connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Upstream base URL; operation paths are resolved against it
    pub base_url: String,
    /// Additional headers sent with every upstream request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_headers: Vec<HeaderPair>,
}

/// SQL database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Driver-specific options string (e.g. `sslmode=require`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

/// Object store connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Typed connection configuration, one variant per connector type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ConnectorConfig {
    Api(ApiConfig),
    Database(DatabaseConfig),
    ObjectStore(ObjectStoreConfig),
}

impl ConnectorConfig {
    /// Get the connector type for this configuration
    pub fn connector_type(&self) -> ConnectorType {
        match self {
            Self::Api(_) => ConnectorType::Api,
            Self::Database(_) => ConnectorType::Database,
            Self::ObjectStore(_) => ConnectorType::ObjectStore,
        }
    }

    /// Validate the configuration payload
    pub fn validate(&self) -> Result<(), ConnectorPayloadError> {
        match self {
            Self::Api(config) => {
                if config.base_url.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("base_url"));
                }
                let url = Url::parse(&config.base_url)
                    .map_err(|_| ConnectorPayloadError::InvalidUrl("base_url"))?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ConnectorPayloadError::InvalidUrl("base_url"));
                }
                for header in &config.extra_headers {
                    if header.name.is_empty() {
                        return Err(ConnectorPayloadError::EmptyField("extra_headers.name"));
                    }
                }
            }
            Self::Database(config) => {
                if config.host.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("host"));
                }
                if config.port == 0 {
                    return Err(ConnectorPayloadError::InvalidPort);
                }
                if config.database.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("database"));
                }
            }
            Self::ObjectStore(config) => {
                if config.endpoint.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("endpoint"));
                }
                Url::parse(&config.endpoint)
                    .map_err(|_| ConnectorPayloadError::InvalidUrl("endpoint"))?;
                if config.bucket.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("bucket"));
                }
            }
        }
        Ok(())
    }
}

/// HTTP API credential material
#[derive(Serialize, Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ApiCredentials {
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// Arbitrary header name/value, e.g. `X-Api-Key`
    Header { name: String, value: String },
    /// HTTP basic authentication
    Basic { username: String, password: String },
}

/// SQL database credential material
#[derive(Serialize, Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
}

/// Object store credential material
#[derive(Serialize, Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
pub struct ObjectStoreCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// Typed credential material, one variant per connector type.
///
/// Deliberately not `Clone`: plaintext credentials live in exactly one
/// place and are wiped when that place is dropped.
#[derive(Serialize, Deserialize, ToSchema, Zeroize, ZeroizeOnDrop)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ConnectorCredentials {
    Api(ApiCredentials),
    Database(DatabaseCredentials),
    ObjectStore(ObjectStoreCredentials),
}

impl ConnectorCredentials {
    /// Get the connector type for this credential payload
    pub fn connector_type(&self) -> ConnectorType {
        match self {
            Self::Api(_) => ConnectorType::Api,
            Self::Database(_) => ConnectorType::Database,
            Self::ObjectStore(_) => ConnectorType::ObjectStore,
        }
    }

    /// Validate the credential payload
    pub fn validate(&self) -> Result<(), ConnectorPayloadError> {
        match self {
            Self::Api(ApiCredentials::Bearer { token }) => {
                if token.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("token"));
                }
            }
            Self::Api(ApiCredentials::Header { name, value }) => {
                if name.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("name"));
                }
                if value.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("value"));
                }
            }
            Self::Api(ApiCredentials::Basic { username, .. }) => {
                if username.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("username"));
                }
            }
            Self::Database(credentials) => {
                if credentials.username.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("username"));
                }
            }
            Self::ObjectStore(credentials) => {
                if credentials.access_key_id.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("access_key_id"));
                }
                if credentials.secret_access_key.is_empty() {
                    return Err(ConnectorPayloadError::EmptyField("secret_access_key"));
                }
            }
        }
        Ok(())
    }

    /// Check that the credential payload agrees with a configuration payload
    /// on the connector type.
    pub fn ensure_matches(&self, config: &ConnectorConfig) -> Result<(), ConnectorPayloadError> {
        let config_type = config.connector_type();
        let credential_type = self.connector_type();
        if config_type != credential_type {
            return Err(ConnectorPayloadError::TypeMismatch {
                config: config_type,
                credentials: credential_type,
            });
        }
        Ok(())
    }
}

// Credentials never appear in logs or panic output, so Debug shows only
// the variant.
impl fmt::Debug for ConnectorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Api(_) => "Api",
            Self::Database(_) => "Database",
            Self::ObjectStore(_) => "ObjectStore",
        };
        write!(f, "ConnectorCredentials::{}([REDACTED])", variant)
    }
}

/// Connection payload validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorPayloadError {
    /// A required field is empty
    EmptyField(&'static str),
    /// A URL field did not parse or used an unsupported scheme
    InvalidUrl(&'static str),
    /// Database port is zero
    InvalidPort,
    /// Config and credential payloads disagree on the connector type
    TypeMismatch {
        config: ConnectorType,
        credentials: ConnectorType,
    },
}

impl fmt::Display for ConnectorPayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "{} cannot be empty", field),
            Self::InvalidUrl(field) => write!(f, "{} must be a valid http(s) URL", field),
            Self::InvalidPort => write!(f, "port must be non-zero"),
            Self::TypeMismatch { config, credentials } => write!(
                f,
                "config is for '{}' but credentials are for '{}'",
                config, credentials
            ),
        }
    }
}

impl std::error::Error for ConnectorPayloadError {}

/// A registered proxy connector as stored in the registry.
///
/// `access_token_hash` is the Argon2 hash of the rotating connector token;
/// the plaintext token is returned exactly once at creation or rotation and
/// never stored.
#[derive(Debug, Clone)]
pub struct ProxyConnector {
    pub id: ConnectorId,
    pub proxy_id: ProxyId,
    pub access_token_hash: String,
    pub name: String,
    pub description: Option<String>,
    pub connector_type: ConnectorType,
    pub vault_id: VaultId,
    pub is_public: bool,
    /// Explicit operation allow-list; empty means the connector-type default
    pub allowed_operations: Vec<String>,
    /// Requests per rate-limit window
    pub rate_limit: u32,
    pub organization_id: String,
    pub created_by: String,
    pub is_active: bool,
    pub total_requests: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProxyConnector {
    /// Whether `operation` is in the connector's effective operation set.
    pub fn allows_operation(&self, operation: &str) -> bool {
        if self.allowed_operations.is_empty() {
            self.connector_type.default_operations().contains(&operation)
        } else {
            self.allowed_operations.iter().any(|allowed| allowed == operation)
        }
    }
}

/// Insert payload for a new proxy connector
#[derive(Debug, Clone)]
pub struct NewProxyConnector {
    pub name: String,
    pub description: Option<String>,
    pub connector_type: ConnectorType,
    pub vault_id: VaultId,
    pub access_token_hash: String,
    pub is_public: bool,
    pub allowed_operations: Vec<String>,
    pub rate_limit: u32,
    pub organization_id: String,
    pub created_by: String,
}
