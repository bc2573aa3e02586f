//! HTTP operation executor
//!
//! Built-in adapter for `api` connectors. Maps `read` to GET and `write`
//! to POST against the configured base URL, injecting the vaulted
//! credential as the appropriate authorization header. Upstream status
//! codes pass through unchanged; only transport failures become errors.

use crate::domain::{ApiConfig, ApiCredentials, ConnectorConfig, ConnectorCredentials, ConnectorType};
use crate::errors::{Result, VaultgateError};
use crate::executor::{OperationExecutor, OperationOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// HTTP adapter over a shared reqwest client
pub struct HttpExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpExecutor {
    /// Create an executor whose client enforces `timeout` per request
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, timeout }
    }

    /// Join the configured base URL and the caller-supplied path.
    ///
    /// The path must be empty or absolute; anything else could escape the
    /// owner's configured base.
    fn build_url(base_url: &str, operation_data: &Value) -> Result<String> {
        let path = match operation_data.get("path") {
            None | Some(Value::Null) => "",
            Some(Value::String(path)) => path.as_str(),
            Some(_) => {
                return Err(VaultgateError::validation_field(
                    "path must be a string",
                    "operation_data.path",
                ))
            }
        };

        if !path.is_empty() && !path.starts_with('/') {
            return Err(VaultgateError::validation_field(
                "path must start with '/'",
                "operation_data.path",
            ));
        }

        Ok(format!("{}{}", base_url.trim_end_matches('/'), path))
    }

    fn apply_credentials(
        builder: reqwest::RequestBuilder,
        credentials: &ApiCredentials,
    ) -> reqwest::RequestBuilder {
        match credentials {
            ApiCredentials::Bearer { token } => builder.bearer_auth(token),
            ApiCredentials::Header { name, value } => builder.header(name, value),
            ApiCredentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
        }
    }

    fn apply_extra_headers(
        mut builder: reqwest::RequestBuilder,
        config: &ApiConfig,
    ) -> reqwest::RequestBuilder {
        for header in &config.extra_headers {
            builder = builder.header(&header.name, &header.value);
        }
        builder
    }
}

#[async_trait]
impl OperationExecutor for HttpExecutor {
    async fn execute(
        &self,
        config: &ConnectorConfig,
        credentials: &ConnectorCredentials,
        operation_type: &str,
        operation_data: &Value,
    ) -> Result<OperationOutput> {
        let ConnectorConfig::Api(api_config) = config else {
            return Err(VaultgateError::internal(
                "HTTP executor dispatched for a non-api connector",
            ));
        };
        let ConnectorCredentials::Api(api_credentials) = credentials else {
            return Err(VaultgateError::internal(
                "HTTP executor received non-api credentials",
            ));
        };

        let url = Self::build_url(&api_config.base_url, operation_data)?;

        let builder = match operation_type {
            "read" => self.client.get(&url),
            "write" => {
                let body = operation_data.get("body").cloned().unwrap_or(Value::Null);
                self.client.post(&url).json(&body)
            }
            other => {
                return Err(VaultgateError::validation(format!(
                    "Operation '{}' is not supported for api connectors",
                    other
                )))
            }
        };

        let builder = Self::apply_extra_headers(builder, api_config);
        let builder = Self::apply_credentials(builder, api_credentials);

        debug!(url = %url, operation = %operation_type, "Dispatching upstream HTTP request");

        // Error messages travel back to the proxy caller, who must never
        // learn the real endpoint. Strip the URL before formatting.
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                VaultgateError::timeout("upstream http request", self.timeout.as_millis() as u64)
            } else {
                VaultgateError::upstream(format!("Upstream request failed: {}", e.without_url()), None)
            }
        })?;

        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            VaultgateError::upstream(
                format!("Failed to read upstream response: {}", e.without_url()),
                Some(status_code),
            )
        })?;

        let response_size = body.len() as i64;
        let data = serde_json::from_str(&body)
            .unwrap_or_else(|_| serde_json::json!({ "raw": body }));

        debug!(status = status_code, response_size, "Upstream HTTP request completed");

        Ok(OperationOutput { status_code, data, response_size })
    }

    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Api
    }
}

impl std::fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("client", &"[reqwest::Client]")
            .field("timeout", &self.timeout)
            .finish()
    }
}
