//! Common test utilities for all integration tests.
//!
//! Builds a full application state over a private in-memory database and
//! drives the router directly, the same way production traffic arrives.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use vaultgate::{
    api::ApiState,
    executor::ExecutorRegistry,
    storage::{self, DbPool},
    vault::{CredentialEncryption, CredentialEncryptionConfig, CredentialVault},
};

pub const TEST_USER: &str = "user-1";
pub const TEST_EMAIL: &str = "user-1@example.com";
pub const TEST_ORG: &str = "org-1";

/// Secret vaulted for upstream calls; tests assert it reaches the upstream
/// and never any response body.
pub const UPSTREAM_TOKEN: &str = "upstream-secret";

/// Counter for generating unique database names within a test run
static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity headers as the platform's auth gateway would set them.
#[derive(Clone, Copy)]
pub struct Identity {
    pub user: &'static str,
    pub email: &'static str,
    pub org: Option<&'static str>,
}

pub fn member() -> Identity {
    Identity { user: TEST_USER, email: TEST_EMAIL, org: Some(TEST_ORG) }
}

pub fn other_org_member() -> Identity {
    Identity { user: "user-2", email: "user-2@elsewhere.io", org: Some("org-2") }
}

pub fn org_less_member() -> Identity {
    Identity { user: "user-3", email: "user-3@example.com", org: None }
}

pub struct TestApp {
    pub state: ApiState,
    pub pool: DbPool,
}

impl TestApp {
    pub fn router(&self) -> Router {
        vaultgate::api::build_router(self.state.clone())
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(Duration::from_secs(5), Duration::from_secs(3600)).await
}

pub async fn setup_test_app_with(
    execute_timeout: Duration,
    rate_limit_window: Duration,
) -> TestApp {
    let db_name = format!(
        "vaultgate_test_{}_{}",
        std::process::id(),
        DB_COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite:file:{}?mode=memory&cache=shared", db_name))
        .await
        .expect("create sqlite pool");

    storage::apply_schema(&pool).await.expect("apply schema for tests");

    let encryption = Arc::new(
        CredentialEncryption::new(&CredentialEncryptionConfig::for_testing())
            .expect("test encryption"),
    );
    let vault = Arc::new(CredentialVault::new(pool.clone(), encryption));
    let executors = Arc::new(ExecutorRegistry::with_builtin_http(execute_timeout));

    let state = ApiState::new(
        pool.clone(),
        vault,
        executors,
        "http://localhost:8080",
        execute_timeout,
        rate_limit_window,
    );

    TestApp { state, pool }
}

pub async fn send_request(
    app: &TestApp,
    method: Method,
    path: &str,
    identity: Option<Identity>,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(identity) = identity {
        builder = builder
            .header("x-auth-user", identity.user)
            .header("x-auth-email", identity.email);
        if let Some(org) = identity.org {
            builder = builder.header("x-auth-org", org);
        }
    }
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let request = if let Some(json) = body {
        let bytes = serde_json::to_vec(&json).expect("serialize body");
        builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .expect("build request")
    } else {
        builder.body(Body::empty()).expect("build request")
    };

    app.router().oneshot(request).await.expect("request")
}

pub async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

/// Request body for an `api` connector pointing at `base_url`, vaulting
/// [`UPSTREAM_TOKEN`] as a bearer credential.
pub fn api_connector_body(name: &str, base_url: &str) -> Value {
    json!({
        "name": name,
        "config": { "type": "api", "payload": { "base_url": base_url } },
        "credentials": { "type": "api", "payload": { "scheme": "bearer", "token": UPSTREAM_TOKEN } }
    })
}

/// Create a connector through the management API as the default member,
/// returning the creation envelope (`connector`, `accessToken`, `proxyUrl`).
pub async fn create_connector(app: &TestApp, body: Value) -> Value {
    let response =
        send_request(app, Method::POST, "/api/v1/connectors", Some(member()), None, Some(body))
            .await;
    assert_eq!(response.status(), StatusCode::CREATED, "create connector");
    read_json(response).await
}

/// Create a shared link for `proxy_id` as the default member, returning the
/// creation envelope (`link`, `publicUrl`).
pub async fn create_link(app: &TestApp, proxy_id: &str, extra: Value) -> Value {
    let mut body = json!({ "proxyId": proxy_id, "name": "test link" });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            body.insert(key.clone(), value.clone());
        }
    }

    let response =
        send_request(app, Method::POST, "/api/v1/links", Some(member()), None, Some(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED, "create link");
    read_json(response).await
}
