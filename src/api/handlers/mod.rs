//! HTTP request handlers organized by resource type

pub mod connectors;
pub mod health;
pub mod links;

pub use connectors::{
    connector_analytics_handler, create_connector_handler, deactivate_connector_handler,
    get_connector_handler, list_connectors_handler, rotate_connector_token_handler,
};
pub use health::health_handler;
pub use links::{create_link_handler, deactivate_link_handler, list_links_handler};

// Re-export DTOs for OpenAPI docs
pub use connectors::{
    AccessLogEntryResponse, AccessLogStatsResponse, ConnectorAnalyticsResponse, ConnectorResponse,
    CreateConnectorBody, CreatedConnectorResponse,
};
pub use health::HealthResponse;
pub use links::{CreateLinkBody, CreatedLinkResponse, LinkResponse};
