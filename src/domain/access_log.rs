//! Access log domain types and detail redaction
//!
//! Every gateway attempt leaves exactly one immutable record, whether it was
//! allowed, denied, or never resolved to a connector at all. Operation
//! details are stored for forensics but pass through [`redact_details`]
//! first so a careless caller cannot persist secrets via the audit trail.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::id::{ConnectorId, LinkId};

/// Key fragments whose values are stripped from logged operation details.
/// Matching is case-insensitive and substring-based; over-redacting is fine,
/// under-redacting is not.
const SENSITIVE_KEY_FRAGMENTS: &[&str] =
    &["password", "secret", "token", "key", "authorization", "credential"];

/// One recorded invocation attempt
#[derive(Debug, Clone)]
pub struct ProxyAccessLog {
    pub id: i64,
    /// None when the request never resolved to a connector
    pub connector_id: Option<ConnectorId>,
    pub shared_link_id: Option<LinkId>,
    /// None means the caller was anonymous
    pub user_id: Option<String>,
    pub user_ip: String,
    pub user_agent: Option<String>,
    pub operation_type: String,
    pub operation_details: Value,
    pub status_code: u16,
    pub response_size: i64,
    pub execution_time_ms: i64,
    pub accessed_at: DateTime<Utc>,
}

/// Insert payload for one access record
#[derive(Debug, Clone)]
pub struct NewAccessLogEntry {
    pub connector_id: Option<ConnectorId>,
    pub shared_link_id: Option<LinkId>,
    pub user_id: Option<String>,
    pub user_ip: String,
    pub user_agent: Option<String>,
    pub operation_type: String,
    pub operation_details: Value,
    pub status_code: u16,
    pub response_size: i64,
    pub execution_time_ms: i64,
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|fragment| key.contains(fragment))
}

/// Recursively replace values under secret-looking keys with `"[REDACTED]"`.
pub fn redact_details(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(key, inner)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_details(inner))
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_details).collect()),
        other => other.clone(),
    }
}
