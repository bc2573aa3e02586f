use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::resolve_caller;
use crate::executor::ExecutorRegistry;
use crate::services::{ConnectorService, LinkService, ProxyGateway};
use crate::storage::DbPool;
use crate::vault::CredentialVault;

use super::{
    docs,
    gateway_handlers::{access_share_handler, execute_proxy_handler},
    handlers::{
        connector_analytics_handler, create_connector_handler, create_link_handler,
        deactivate_connector_handler, deactivate_link_handler, get_connector_handler,
        health_handler, list_connectors_handler, list_links_handler,
        rotate_connector_token_handler,
    },
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub connectors: ConnectorService,
    pub links: LinkService,
    pub gateway: ProxyGateway,
    pub pool: DbPool,
}

impl ApiState {
    pub fn new(
        pool: DbPool,
        vault: Arc<CredentialVault>,
        executors: Arc<ExecutorRegistry>,
        public_url: impl Into<String>,
        execute_timeout: Duration,
        rate_limit_window: Duration,
    ) -> Self {
        let public_url = public_url.into();
        Self {
            connectors: ConnectorService::new(pool.clone(), vault.clone(), public_url.clone()),
            links: LinkService::new(pool.clone(), public_url),
            gateway: ProxyGateway::new(
                pool.clone(),
                vault,
                executors,
                execute_timeout,
                rate_limit_window,
            ),
            pool,
        }
    }
}

/// Build the HTTP router with default options (no CORS).
pub fn build_router(state: ApiState) -> Router {
    build_router_with_options(state, false)
}

/// Build the HTTP router, optionally layering permissive CORS for
/// browser-facing deployments.
pub fn build_router_with_options(state: ApiState, permissive_cors: bool) -> Router {
    let management = Router::new()
        .route(
            "/api/v1/connectors",
            post(create_connector_handler).get(list_connectors_handler),
        )
        .route(
            "/api/v1/connectors/{proxy_id}",
            get(get_connector_handler).delete(deactivate_connector_handler),
        )
        .route(
            "/api/v1/connectors/{proxy_id}/rotate-token",
            post(rotate_connector_token_handler),
        )
        .route(
            "/api/v1/connectors/{proxy_id}/analytics",
            get(connector_analytics_handler),
        )
        .route(
            "/api/v1/links",
            post(create_link_handler).get(list_links_handler),
        )
        .route("/api/v1/links/{share_id}", delete(deactivate_link_handler));

    let gateway = Router::new()
        .route("/proxy/{proxy_id}/execute", post(execute_proxy_handler))
        .route("/share/{share_id}", get(access_share_handler));

    let router = Router::new()
        .merge(management)
        .merge(gateway)
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(middleware::from_fn(resolve_caller))
        .merge(docs::docs_router());

    let router = if permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}
