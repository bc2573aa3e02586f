use axum::Router;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[allow(unused_imports)]
use crate::api::gateway_handlers::ExecuteOperationBody;
#[allow(unused_imports)]
use crate::api::handlers::{
    AccessLogEntryResponse, AccessLogStatsResponse, ConnectorAnalyticsResponse, ConnectorResponse,
    CreateConnectorBody, CreateLinkBody, CreatedConnectorResponse, CreatedLinkResponse,
    HealthResponse, LinkResponse,
};
#[allow(unused_imports)]
use crate::domain::connector::{
    ApiConfig, ApiCredentials, ConnectorConfig, ConnectorCredentials, ConnectorType,
    DatabaseConfig, DatabaseCredentials, HeaderPair, ObjectStoreConfig, ObjectStoreCredentials,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::connectors::create_connector_handler,
        crate::api::handlers::connectors::list_connectors_handler,
        crate::api::handlers::connectors::get_connector_handler,
        crate::api::handlers::connectors::deactivate_connector_handler,
        crate::api::handlers::connectors::rotate_connector_token_handler,
        crate::api::handlers::connectors::connector_analytics_handler,
        crate::api::handlers::links::create_link_handler,
        crate::api::handlers::links::list_links_handler,
        crate::api::handlers::links::deactivate_link_handler,
        crate::api::gateway_handlers::execute_proxy_handler,
        crate::api::gateway_handlers::access_share_handler
    ),
    components(
        schemas(
            HealthResponse,
            CreateConnectorBody,
            ConnectorResponse,
            CreatedConnectorResponse,
            AccessLogStatsResponse,
            AccessLogEntryResponse,
            ConnectorAnalyticsResponse,
            CreateLinkBody,
            LinkResponse,
            CreatedLinkResponse,
            ExecuteOperationBody,
            ConnectorType,
            ConnectorConfig,
            ApiConfig,
            DatabaseConfig,
            ObjectStoreConfig,
            HeaderPair,
            ConnectorCredentials,
            ApiCredentials,
            DatabaseCredentials,
            ObjectStoreCredentials
        )
    ),
    tags(
        (name = "connectors", description = "Proxy connector management"),
        (name = "links", description = "Shared proxy link management"),
        (name = "proxy", description = "Gateway execution and shared access"),
        (name = "health", description = "Service health")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "proxyAccessToken",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

pub fn docs_router() -> Router {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()).into()
}
