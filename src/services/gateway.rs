//! Request pipeline for proxied operations.
//!
//! Every attempt, whether it arrives through a proxy identity or a shared
//! link, moves through the same stages: resolve the handle, evaluate the
//! access rules, execute against the hidden upstream, write exactly one
//! access-log row, and respond. Credentials are revealed only after the
//! rules pass and only for the duration of the dispatch. Unresolvable
//! handles still produce a log row, with no connector attached, so probing
//! is visible in the audit trail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use crate::auth::{parse_access_token, AccessTokenService};
use crate::domain::{
    redact_details, CallerContext, NewAccessLogEntry, ProxyConnector, ProxyId, ShareId,
    SharedProxyLink,
};
use crate::errors::{Result, VaultgateError};
use crate::executor::{ExecutorRegistry, OperationOutput};
use crate::observability::metrics;
use crate::policy::{self, AccessRequest, DenyReason, FixedWindowLimiter};
use crate::storage::{AccessLogRepository, ConnectorRepository, DbPool, LinkRepository};
use crate::vault::CredentialVault;

/// Shared links always perform the read operation.
const SHARE_OPERATION: &str = "read";

/// Final status and JSON body for one proxied attempt. Handlers return
/// both verbatim; the pipeline has already logged the outcome.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status_code: u16,
    pub body: Value,
}

/// How one attempt ended, before the log row and response are built.
enum Outcome {
    /// Rules passed and the upstream answered; its status passes through
    Allowed(OperationOutput),
    Denied(DenyReason),
    /// The pipeline itself failed; `error` is a stable machine code
    Failed { status_code: u16, error: &'static str, message: String },
}

#[derive(Clone)]
pub struct ProxyGateway {
    connectors: ConnectorRepository,
    links: LinkRepository,
    access_logs: AccessLogRepository,
    vault: Arc<CredentialVault>,
    executors: Arc<ExecutorRegistry>,
    limiter: FixedWindowLimiter,
    tokens: AccessTokenService,
    execute_timeout: Duration,
}

impl ProxyGateway {
    pub fn new(
        pool: DbPool,
        vault: Arc<CredentialVault>,
        executors: Arc<ExecutorRegistry>,
        execute_timeout: Duration,
        rate_limit_window: Duration,
    ) -> Self {
        Self {
            connectors: ConnectorRepository::new(pool.clone()),
            links: LinkRepository::new(pool.clone()),
            access_logs: AccessLogRepository::new(pool),
            vault,
            executors,
            limiter: FixedWindowLimiter::new(rate_limit_window),
            tokens: AccessTokenService::new(),
            execute_timeout,
        }
    }

    /// Run one operation against the connector behind `proxy_handle`.
    ///
    /// A `vgc_` bearer token, when present, must verify against the
    /// connector's stored hash and then acts as the owner's identity; a
    /// token that fails verification denies the attempt outright.
    #[instrument(
        skip(self, caller, bearer_token, operation_data),
        fields(proxy_handle = %proxy_handle, operation = %operation_type),
        name = "proxy_execute"
    )]
    pub async fn execute_via_proxy(
        &self,
        caller: &CallerContext,
        proxy_handle: &str,
        bearer_token: Option<&str>,
        operation_type: &str,
        operation_data: Value,
    ) -> GatewayResponse {
        let started = Instant::now();
        let now = Utc::now();

        let connector = match self.resolve_connector(proxy_handle).await {
            Ok(Some(connector)) => connector,
            Ok(None) => {
                return self
                    .respond_unresolved(caller, proxy_handle, operation_type, &operation_data, started, None)
                    .await;
            }
            Err(err) => {
                return self
                    .respond_unresolved(
                        caller,
                        proxy_handle,
                        operation_type,
                        &operation_data,
                        started,
                        Some(err),
                    )
                    .await;
            }
        };

        self.count_resolved_attempt(&connector).await;

        let (effective_caller, token_rejected) =
            self.apply_access_token(caller, &connector, bearer_token);

        let outcome = self
            .evaluate_and_execute(
                &connector,
                None,
                &effective_caller,
                token_rejected,
                operation_type,
                &operation_data,
                now,
            )
            .await;

        self.finish(
            Some(&connector),
            None,
            &effective_caller,
            operation_type,
            &operation_data,
            None,
            outcome,
            started,
        )
        .await
    }

    /// Run the full pipeline for a shared link with the implicit read
    /// operation. A grant consumes one use before dispatch; an upstream
    /// failure afterwards does not refund it.
    #[instrument(
        skip(self, caller),
        fields(share_handle = %share_handle),
        name = "share_access"
    )]
    pub async fn access_via_share(
        &self,
        caller: &CallerContext,
        share_handle: &str,
    ) -> GatewayResponse {
        let started = Instant::now();
        let now = Utc::now();
        let operation_data = Value::Null;

        let link = match self.resolve_link(share_handle).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                return self
                    .respond_unresolved(caller, share_handle, SHARE_OPERATION, &operation_data, started, None)
                    .await;
            }
            Err(err) => {
                return self
                    .respond_unresolved(
                        caller,
                        share_handle,
                        SHARE_OPERATION,
                        &operation_data,
                        started,
                        Some(err),
                    )
                    .await;
            }
        };

        let connector = match self.connectors.find_by_id(&link.connector_id).await {
            Ok(Some(connector)) => connector,
            Ok(None) => {
                // The link row references its connector by foreign key, so an
                // absent connector means the store is inconsistent
                error!(link_id = %link.id, "Shared link references a missing connector");
                let outcome = internal_failure();
                return self
                    .finish(
                        None,
                        Some(&link),
                        caller,
                        SHARE_OPERATION,
                        &operation_data,
                        Some(share_handle),
                        outcome,
                        started,
                    )
                    .await;
            }
            Err(err) => {
                error!(link_id = %link.id, error = %err, "Failed to load connector for shared link");
                let outcome = internal_failure();
                return self
                    .finish(
                        None,
                        Some(&link),
                        caller,
                        SHARE_OPERATION,
                        &operation_data,
                        Some(share_handle),
                        outcome,
                        started,
                    )
                    .await;
            }
        };

        self.count_resolved_attempt(&connector).await;

        let outcome = self
            .evaluate_and_execute(
                &connector,
                Some(&link),
                caller,
                false,
                SHARE_OPERATION,
                &operation_data,
                now,
            )
            .await;
        let granted = matches!(&outcome, Outcome::Allowed(_));

        let response = self
            .finish(
                Some(&connector),
                Some(&link),
                caller,
                SHARE_OPERATION,
                &operation_data,
                None,
                outcome,
                started,
            )
            .await;

        if granted {
            let body = json!({
                "sharedLink": { "name": link.name, "description": link.description },
                "result": response.body,
            });
            return GatewayResponse { status_code: response.status_code, body };
        }
        response
    }

    /// Drop rate-limit windows that can no longer affect a decision.
    pub fn sweep_rate_windows(&self) {
        self.limiter.sweep(Utc::now());
    }

    async fn resolve_connector(&self, proxy_handle: &str) -> Result<Option<ProxyConnector>> {
        let Ok(proxy_id) = ProxyId::parse(proxy_handle) else {
            return Ok(None);
        };
        self.connectors.find_by_proxy_id(&proxy_id).await
    }

    async fn resolve_link(&self, share_handle: &str) -> Result<Option<SharedProxyLink>> {
        let Ok(share_id) = ShareId::parse(share_handle) else {
            return Ok(None);
        };
        self.links.find_by_share_id(&share_id).await
    }

    /// Usage counters cover every resolved attempt, allowed or denied.
    async fn count_resolved_attempt(&self, connector: &ProxyConnector) {
        if let Err(err) = self.connectors.increment_usage(&connector.id).await {
            warn!(
                connector_id = %connector.id,
                error = %err,
                "Failed to bump connector usage counters"
            );
        }
    }

    /// Resolve an optional bearer token against the connector's stored hash.
    ///
    /// Returns the caller to evaluate with and whether a presented token was
    /// rejected. A verified token substitutes the owner's identity; a
    /// missing token changes nothing.
    fn apply_access_token(
        &self,
        caller: &CallerContext,
        connector: &ProxyConnector,
        bearer_token: Option<&str>,
    ) -> (CallerContext, bool) {
        let Some(token) = bearer_token else {
            return (caller.clone(), false);
        };

        if let Some((connector_id, secret)) = parse_access_token(token) {
            if connector_id == connector.id {
                match self.tokens.verify_secret(&connector.access_token_hash, secret) {
                    Ok(true) => {
                        let owner = CallerContext {
                            user_id: Some(connector.created_by.clone()),
                            email: None,
                            organization_id: Some(connector.organization_id.clone()),
                            ip: caller.ip.clone(),
                            user_agent: caller.user_agent.clone(),
                        };
                        return (owner, false);
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            connector_id = %connector.id,
                            error = %err,
                            "Stored access-token hash could not be verified"
                        );
                    }
                }
            }
        }
        debug!(connector_id = %connector.id, "Rejected connector access token");
        (caller.clone(), true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_and_execute(
        &self,
        connector: &ProxyConnector,
        link: Option<&SharedProxyLink>,
        caller: &CallerContext,
        token_rejected: bool,
        operation_type: &str,
        operation_data: &Value,
        now: DateTime<Utc>,
    ) -> Outcome {
        let request = AccessRequest { connector, link, caller, operation: operation_type, now };
        let decision = policy::evaluate(&request);
        let decision = if token_rejected {
            // A failed token still loses to the connector/link state rules,
            // then denies as an authentication failure even on public
            // connectors: presenting a bad secret is never anonymous access
            match decision {
                Err(
                    reason @ (DenyReason::ConnectorInactive
                    | DenyReason::LinkExpired
                    | DenyReason::UsesExhausted),
                ) => Err(reason),
                _ => Err(DenyReason::AuthRequired),
            }
        } else {
            decision
        };
        if let Err(reason) = decision {
            return Outcome::Denied(reason);
        }

        // Runs after the pure rules so earlier denials spend no budget
        if !self.limiter.check_and_count(connector.proxy_id.as_str(), connector.rate_limit, now) {
            return Outcome::Denied(DenyReason::RateLimited);
        }

        if let Some(link) = link {
            // The use is consumed at grant time, atomically against
            // concurrent grants racing for the last slot
            match self.links.record_use(&link.id).await {
                Ok(true) => {}
                Ok(false) => return Outcome::Denied(DenyReason::UsesExhausted),
                Err(err) => {
                    error!(link_id = %link.id, error = %err, "Failed to record link use");
                    return internal_failure();
                }
            }
        }

        let revealed = match self.vault.reveal(&connector.vault_id).await {
            Ok(revealed) => {
                metrics::record_vault_operation("reveal", true);
                revealed
            }
            Err(err) => {
                metrics::record_vault_operation("reveal", false);
                error!(
                    connector_id = %connector.id,
                    error = %err,
                    "Failed to reveal vaulted credentials"
                );
                return internal_failure();
            }
        };

        match tokio::time::timeout(
            self.execute_timeout,
            self.executors.dispatch(
                revealed.config(),
                revealed.credentials(),
                operation_type,
                operation_data,
            ),
        )
        .await
        {
            Err(_) => Outcome::Failed {
                status_code: 504,
                error: "timeout",
                message: format!(
                    "Operation timed out after {}ms",
                    self.execute_timeout.as_millis()
                ),
            },
            Ok(Err(err)) => {
                warn!(connector_id = %connector.id, error = %err, "Proxy operation failed");
                Outcome::Failed {
                    status_code: err.status_code(),
                    error: error_code(&err),
                    message: client_message(err),
                }
            }
            Ok(Ok(output)) => Outcome::Allowed(output),
        }
    }

    /// A handle that never resolved still leaves an audit row, carrying the
    /// requested handle but no connector reference.
    async fn respond_unresolved(
        &self,
        caller: &CallerContext,
        requested_handle: &str,
        operation_type: &str,
        operation_data: &Value,
        started: Instant,
        failure: Option<VaultgateError>,
    ) -> GatewayResponse {
        let outcome = match failure {
            Some(err) => {
                error!(requested_handle = %requested_handle, error = %err, "Proxy resolution failed");
                internal_failure()
            }
            None => Outcome::Failed {
                status_code: 404,
                error: "not_found",
                message: "Unknown proxy identity".to_string(),
            },
        };
        self.finish(
            None,
            None,
            caller,
            operation_type,
            operation_data,
            Some(requested_handle),
            outcome,
            started,
        )
        .await
    }

    /// Turn an outcome into the response, after writing the single
    /// access-log row every attempt gets. A failed log write is reported
    /// and counted but never masks the response.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        connector: Option<&ProxyConnector>,
        link: Option<&SharedProxyLink>,
        caller: &CallerContext,
        operation_type: &str,
        operation_data: &Value,
        requested_handle: Option<&str>,
        outcome: Outcome,
        started: Instant,
    ) -> GatewayResponse {
        let execution_time_ms = started.elapsed().as_millis() as i64;
        let (status_code, body, response_size, deny_reason) = match outcome {
            Outcome::Allowed(output) => {
                let response_size = output.response_size;
                (
                    output.status_code,
                    success_body(output.data, execution_time_ms),
                    response_size,
                    None,
                )
            }
            Outcome::Denied(reason) => (
                reason.status_code(),
                error_body(reason.as_str(), deny_message(reason)),
                0,
                Some(reason),
            ),
            Outcome::Failed { status_code, error, message } => {
                (status_code, error_body(error, &message), 0, None)
            }
        };

        let mut details = serde_json::Map::new();
        if let Some(handle) = requested_handle {
            details.insert("requestedHandle".to_string(), Value::String(handle.to_string()));
        }
        if !operation_data.is_null() {
            details.insert("data".to_string(), redact_details(operation_data));
        }
        if let Some(reason) = deny_reason {
            details.insert("deniedReason".to_string(), Value::String(reason.as_str().to_string()));
        }

        let entry = NewAccessLogEntry {
            connector_id: connector.map(|c| c.id.clone()),
            shared_link_id: link.map(|l| l.id.clone()),
            user_id: caller.user_id.clone(),
            user_ip: caller.ip.clone(),
            user_agent: caller.user_agent.clone(),
            operation_type: operation_type.to_string(),
            operation_details: Value::Object(details),
            status_code,
            response_size,
            execution_time_ms,
        };
        if let Err(err) = self.access_logs.record(&entry).await {
            metrics::record_access_log_failure();
            error!(error = %err, "Failed to write proxy access log entry");
        }

        if let Some(reason) = deny_reason {
            metrics::record_proxy_denial(reason.as_str());
            debug!(reason = %reason, status = status_code, "Proxy request denied");
        }
        let connector_type =
            connector.map(|c| c.connector_type.as_str()).unwrap_or("unknown");
        metrics::record_proxy_request(connector_type, status_code, started.elapsed().as_secs_f64());

        GatewayResponse { status_code, body }
    }
}

impl std::fmt::Debug for ProxyGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyGateway")
            .field("executors", &self.executors)
            .field("execute_timeout", &self.execute_timeout)
            .finish()
    }
}

fn internal_failure() -> Outcome {
    Outcome::Failed {
        status_code: 500,
        error: "internal_error",
        message: "Proxy request failed".to_string(),
    }
}

fn success_body(data: Value, execution_time_ms: i64) -> Value {
    json!({ "status": "success", "data": data, "execution_time_ms": execution_time_ms })
}

fn error_body(error: &str, message: &str) -> Value {
    json!({ "status": "error", "error": error, "message": message })
}

fn deny_message(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::ConnectorInactive => "This connector is no longer active",
        DenyReason::LinkExpired => "This shared link has expired",
        DenyReason::UsesExhausted => "This shared link has reached its usage limit",
        DenyReason::AuthRequired => "Authentication is required to access this resource",
        DenyReason::UserNotAllowed => "You are not allowed to access this resource",
        DenyReason::DomainNotAllowed => "Your email domain is not allowed to access this resource",
        DenyReason::OperationNotAllowed => "This operation is not allowed on this connector",
        DenyReason::RateLimited => "Rate limit exceeded, try again later",
    }
}

/// Stable machine code for a pipeline failure.
fn error_code(err: &VaultgateError) -> &'static str {
    match err {
        VaultgateError::Validation { .. } => "validation_error",
        VaultgateError::Upstream { .. } => "upstream_error",
        VaultgateError::Timeout { .. } => "timeout",
        _ => "internal_error",
    }
}

/// What the proxy caller is allowed to see about a failure. Validation and
/// upstream messages are already sanitized; everything else is generic.
fn client_message(err: VaultgateError) -> String {
    match err {
        VaultgateError::Validation { message, .. } => message,
        VaultgateError::Upstream { message, .. } => message,
        VaultgateError::Timeout { .. } => "Upstream request timed out".to_string(),
        _ => "Proxy execution failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ApiConfig, ApiCredentials, ConnectorConfig, ConnectorCredentials, ConnectorType,
    };
    use crate::executor::OperationExecutor;
    use crate::services::{ConnectorService, CreateConnectorInput, CreateLinkInput, LinkService};
    use crate::storage::apply_schema;
    use crate::vault::{CredentialEncryption, CredentialEncryptionConfig};
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    #[derive(Debug)]
    struct StubExecutor {
        status: u16,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl OperationExecutor for StubExecutor {
        async fn execute(
            &self,
            _config: &ConnectorConfig,
            _credentials: &ConnectorCredentials,
            operation_type: &str,
            _operation_data: &Value,
        ) -> Result<OperationOutput> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(OperationOutput {
                status_code: self.status,
                data: json!({ "echo": operation_type }),
                response_size: 17,
            })
        }

        fn connector_type(&self) -> ConnectorType {
            ConnectorType::Api
        }
    }

    struct Harness {
        gateway: ProxyGateway,
        connectors: ConnectorService,
        links: LinkService,
        pool: DbPool,
    }

    async fn harness_with(stub: StubExecutor, execute_timeout: Duration) -> Harness {
        let url =
            format!("sqlite:file:{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("in-memory pool");
        apply_schema(&pool).await.expect("schema");

        let encryption = CredentialEncryption::new(&CredentialEncryptionConfig::for_testing())
            .expect("test encryption");
        let vault = Arc::new(CredentialVault::new(pool.clone(), Arc::new(encryption)));

        let mut registry = ExecutorRegistry::new();
        registry.register(Arc::new(stub));

        let gateway = ProxyGateway::new(
            pool.clone(),
            vault.clone(),
            Arc::new(registry),
            execute_timeout,
            Duration::from_secs(60),
        );
        let connectors = ConnectorService::new(pool.clone(), vault, "https://gateway.test");
        let links = LinkService::new(pool.clone(), "https://gateway.test");
        Harness { gateway, connectors, links, pool }
    }

    async fn harness() -> Harness {
        harness_with(StubExecutor { status: 200, delay: None }, Duration::from_secs(5)).await
    }

    fn owner() -> CallerContext {
        CallerContext {
            user_id: Some("user-1".to_string()),
            email: Some("owner@corp.test".to_string()),
            organization_id: Some("org-1".to_string()),
            ip: "127.0.0.1".to_string(),
            user_agent: Some("test-agent".to_string()),
        }
    }

    fn anonymous() -> CallerContext {
        CallerContext::anonymous("203.0.113.50", Some("curl/8.5".to_string()))
    }

    async fn create_connector(harness: &Harness, is_public: bool, rate_limit: Option<u32>) -> crate::services::CreatedConnector {
        harness
            .connectors
            .create_connector(
                &owner(),
                CreateConnectorInput {
                    name: "billing".to_string(),
                    description: None,
                    config: ConnectorConfig::Api(ApiConfig {
                        base_url: "https://internal-api.corp.test".to_string(),
                        extra_headers: Vec::new(),
                    }),
                    credentials: ConnectorCredentials::Api(ApiCredentials::Bearer {
                        token: "real-upstream-token".to_string(),
                    }),
                    is_public,
                    allowed_operations: Vec::new(),
                    rate_limit,
                },
            )
            .await
            .expect("connector")
    }

    async fn log_rows(pool: &DbPool) -> Vec<(Option<String>, i64, String)> {
        sqlx::query_as(
            "SELECT connector_id, status_code, operation_details FROM proxy_access_logs \
             ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .expect("log rows")
    }

    #[tokio::test]
    async fn public_connector_executes_and_logs() {
        let harness = harness().await;
        let created = create_connector(&harness, true, None).await;

        let response = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                created.connector.proxy_id.as_str(),
                None,
                "read",
                json!({ "path": "/v1/invoices" }),
            )
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["status"], "success");
        assert_eq!(response.body["data"]["echo"], "read");
        assert!(response.body["execution_time_ms"].is_i64());

        let rows = log_rows(&harness.pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.as_deref(), Some(created.connector.id.as_str()));
        assert_eq!(rows[0].1, 200);

        let connector = harness
            .connectors
            .get_connector(&owner(), created.connector.proxy_id.as_str())
            .await
            .unwrap();
        assert_eq!(connector.total_requests, 1);
        assert!(connector.last_accessed_at.is_some());
    }

    #[tokio::test]
    async fn unknown_handle_gets_synthetic_log_row() {
        let harness = harness().await;

        let response = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                "pxy_aaaaaaaaaaaaaaaaaaaaaaaa",
                None,
                "read",
                Value::Null,
            )
            .await;

        assert_eq!(response.status_code, 404);
        assert_eq!(response.body["error"], "not_found");

        let rows = log_rows(&harness.pool).await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].0.is_none());
        assert_eq!(rows[0].1, 404);
        let details: Value = serde_json::from_str(&rows[0].2).unwrap();
        assert_eq!(details["requestedHandle"], "pxy_aaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[tokio::test]
    async fn malformed_handle_is_indistinguishable_from_absent() {
        let harness = harness().await;

        let response = harness
            .gateway
            .execute_via_proxy(&anonymous(), "not-a-handle", None, "read", Value::Null)
            .await;

        assert_eq!(response.status_code, 404);
        assert_eq!(response.body["error"], "not_found");
    }

    #[tokio::test]
    async fn inactive_connector_denies_and_still_counts() {
        let harness = harness().await;
        let created = create_connector(&harness, true, None).await;
        let handle = created.connector.proxy_id.as_str().to_string();
        harness.connectors.deactivate_connector(&owner(), &handle).await.unwrap();

        let response =
            harness.gateway.execute_via_proxy(&anonymous(), &handle, None, "read", Value::Null).await;

        assert_eq!(response.status_code, 403);
        assert_eq!(response.body["error"], "connector_inactive");

        let rows = log_rows(&harness.pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, 403);
        let details: Value = serde_json::from_str(&rows[0].2).unwrap();
        assert_eq!(details["deniedReason"], "connector_inactive");

        // Denied attempts still count toward usage
        let connector = harness.connectors.get_connector(&owner(), &handle).await.unwrap();
        assert_eq!(connector.total_requests, 1);
    }

    #[tokio::test]
    async fn private_connector_requires_identity_or_owner_token() {
        let harness = harness().await;
        let created = create_connector(&harness, false, None).await;
        let handle = created.connector.proxy_id.as_str().to_string();

        let denied =
            harness.gateway.execute_via_proxy(&anonymous(), &handle, None, "read", Value::Null).await;
        assert_eq!(denied.status_code, 401);
        assert_eq!(denied.body["error"], "auth_required");

        let allowed = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                &handle,
                Some(created.access_token.as_str()),
                "read",
                Value::Null,
            )
            .await;
        assert_eq!(allowed.status_code, 200);
        assert_eq!(allowed.body["status"], "success");

        // The owner's identity lands in the audit trail for the token call
        let rows: Vec<(Option<String>,)> = sqlx::query_as(
            "SELECT user_id FROM proxy_access_logs ORDER BY id",
        )
        .fetch_all(&harness.pool)
        .await
        .unwrap();
        assert_eq!(rows[0].0, None);
        assert_eq!(rows[1].0.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn invalid_token_denies_even_on_public_connectors() {
        let harness = harness().await;
        let created = create_connector(&harness, true, None).await;

        let response = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                created.connector.proxy_id.as_str(),
                Some("vgc_00000000-0000-4000-8000-000000000000.wrongsecret"),
                "read",
                Value::Null,
            )
            .await;

        assert_eq!(response.status_code, 401);
        assert_eq!(response.body["error"], "auth_required");
    }

    #[tokio::test]
    async fn disallowed_operation_is_denied() {
        let harness = harness().await;
        let created = create_connector(&harness, true, None).await;

        // api connectors default to read/write; "list" is out of set for them
        let response = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                created.connector.proxy_id.as_str(),
                None,
                "list",
                Value::Null,
            )
            .await;

        assert_eq!(response.status_code, 403);
        assert_eq!(response.body["error"], "operation_not_allowed");
    }

    #[tokio::test]
    async fn rate_limit_denies_after_budget_is_spent() {
        let harness = harness().await;
        let created = create_connector(&harness, true, Some(2)).await;
        let handle = created.connector.proxy_id.as_str();

        for _ in 0..2 {
            let ok =
                harness.gateway.execute_via_proxy(&anonymous(), handle, None, "read", Value::Null).await;
            assert_eq!(ok.status_code, 200);
        }
        let limited =
            harness.gateway.execute_via_proxy(&anonymous(), handle, None, "read", Value::Null).await;
        assert_eq!(limited.status_code, 429);
        assert_eq!(limited.body["error"], "rate_limited");

        let rows = log_rows(&harness.pool).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].1, 429);
    }

    #[tokio::test]
    async fn execution_timeout_maps_to_gateway_timeout() {
        let harness = harness_with(
            StubExecutor { status: 200, delay: Some(Duration::from_millis(200)) },
            Duration::from_millis(50),
        )
        .await;
        let created = create_connector(&harness, true, None).await;

        let response = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                created.connector.proxy_id.as_str(),
                None,
                "read",
                Value::Null,
            )
            .await;

        assert_eq!(response.status_code, 504);
        assert_eq!(response.body["error"], "timeout");

        let rows = log_rows(&harness.pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, 504);
    }

    #[tokio::test]
    async fn upstream_status_passes_through() {
        let harness =
            harness_with(StubExecutor { status: 502, delay: None }, Duration::from_secs(5)).await;
        let created = create_connector(&harness, true, None).await;

        let response = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                created.connector.proxy_id.as_str(),
                None,
                "read",
                Value::Null,
            )
            .await;

        // The upstream answered; its status is the caller's status
        assert_eq!(response.status_code, 502);
        assert_eq!(response.body["status"], "success");
    }

    #[tokio::test]
    async fn share_grant_wraps_result_and_consumes_use() {
        let harness = harness().await;
        let created = create_connector(&harness, false, None).await;
        let link = harness
            .links
            .create_link(
                &owner(),
                CreateLinkInput {
                    proxy_id: created.connector.proxy_id.as_str().to_string(),
                    name: "partner access".to_string(),
                    description: Some("for partner".to_string()),
                    is_public: false,
                    requires_authentication: false,
                    allowed_users: Vec::new(),
                    allowed_domains: Vec::new(),
                    expires_in_hours: None,
                    max_uses: Some(2),
                },
            )
            .await
            .unwrap();
        let handle = link.link.share_id.as_str().to_string();

        let first = harness.gateway.access_via_share(&anonymous(), &handle).await;
        assert_eq!(first.status_code, 200);
        assert_eq!(first.body["sharedLink"]["name"], "partner access");
        assert_eq!(first.body["result"]["status"], "success");

        let second = harness.gateway.access_via_share(&anonymous(), &handle).await;
        assert_eq!(second.status_code, 200);

        let third = harness.gateway.access_via_share(&anonymous(), &handle).await;
        assert_eq!(third.status_code, 403);
        assert_eq!(third.body["error"], "uses_exhausted");
        // Denied responses carry no link metadata
        assert!(third.body.get("sharedLink").is_none());

        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            "SELECT shared_link_id, status_code FROM proxy_access_logs ORDER BY id",
        )
        .fetch_all(&harness.pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|(link_id, _)| link_id.as_deref() == Some(link.link.id.as_str())));
        assert_eq!(rows[2].1, 403);
    }

    #[tokio::test]
    async fn expired_link_denies_with_link_expired() {
        let harness = harness().await;
        let created = create_connector(&harness, false, None).await;
        let link = harness
            .links
            .create_link(
                &owner(),
                CreateLinkInput {
                    proxy_id: created.connector.proxy_id.as_str().to_string(),
                    name: "short lived".to_string(),
                    description: None,
                    is_public: false,
                    requires_authentication: false,
                    allowed_users: Vec::new(),
                    allowed_domains: Vec::new(),
                    expires_in_hours: Some(1),
                    max_uses: None,
                },
            )
            .await
            .unwrap();

        sqlx::query("UPDATE shared_proxy_links SET expires_at = $1 WHERE id = $2")
            .bind(Utc::now() - chrono::Duration::minutes(5))
            .bind(link.link.id.as_str())
            .execute(&harness.pool)
            .await
            .unwrap();

        let response =
            harness.gateway.access_via_share(&anonymous(), link.link.share_id.as_str()).await;
        assert_eq!(response.status_code, 403);
        assert_eq!(response.body["error"], "link_expired");

        let rows = log_rows(&harness.pool).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, 403);
    }

    #[tokio::test]
    async fn share_link_can_require_authentication() {
        let harness = harness().await;
        let created = create_connector(&harness, true, None).await;
        let link = harness
            .links
            .create_link(
                &owner(),
                CreateLinkInput {
                    proxy_id: created.connector.proxy_id.as_str().to_string(),
                    name: "named users only".to_string(),
                    description: None,
                    is_public: false,
                    requires_authentication: true,
                    allowed_users: vec!["dana@corp.test".to_string()],
                    allowed_domains: Vec::new(),
                    expires_in_hours: None,
                    max_uses: None,
                },
            )
            .await
            .unwrap();
        let handle = link.link.share_id.as_str().to_string();

        let denied = harness.gateway.access_via_share(&anonymous(), &handle).await;
        assert_eq!(denied.status_code, 401);
        assert_eq!(denied.body["error"], "auth_required");

        let wrong_user = CallerContext {
            user_id: Some("user-9".to_string()),
            email: Some("mallory@corp.test".to_string()),
            organization_id: None,
            ip: "203.0.113.50".to_string(),
            user_agent: None,
        };
        let not_allowed = harness.gateway.access_via_share(&wrong_user, &handle).await;
        assert_eq!(not_allowed.status_code, 403);
        assert_eq!(not_allowed.body["error"], "user_not_allowed");

        let dana = CallerContext {
            user_id: Some("user-7".to_string()),
            email: Some("Dana@Corp.Test".to_string()),
            organization_id: None,
            ip: "203.0.113.50".to_string(),
            user_agent: None,
        };
        let allowed = harness.gateway.access_via_share(&dana, &handle).await;
        assert_eq!(allowed.status_code, 200);
    }

    #[tokio::test]
    async fn missing_executor_surfaces_as_upstream_error() {
        // Registry without any adapters
        let url =
            format!("sqlite:file:{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("in-memory pool");
        apply_schema(&pool).await.expect("schema");
        let encryption = CredentialEncryption::new(&CredentialEncryptionConfig::for_testing())
            .expect("test encryption");
        let vault = Arc::new(CredentialVault::new(pool.clone(), Arc::new(encryption)));
        let gateway = ProxyGateway::new(
            pool.clone(),
            vault.clone(),
            Arc::new(ExecutorRegistry::new()),
            Duration::from_secs(5),
            Duration::from_secs(60),
        );
        let connectors = ConnectorService::new(pool.clone(), vault, "https://gateway.test");
        let harness = Harness { gateway, connectors, links: LinkService::new(pool.clone(), "https://gateway.test"), pool };

        let created = create_connector(&harness, true, None).await;
        let response = harness
            .gateway
            .execute_via_proxy(
                &anonymous(),
                created.connector.proxy_id.as_str(),
                None,
                "read",
                Value::Null,
            )
            .await;

        assert_eq!(response.status_code, 502);
        assert_eq!(response.body["error"], "upstream_error");
    }
}
