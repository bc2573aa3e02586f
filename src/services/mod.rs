//! Business services composing storage, the vault, access rules, and
//! operation executors. HTTP handlers stay thin; everything with a
//! security consequence happens here.

mod connector_service;
mod gateway;
mod link_service;

pub use connector_service::{
    ConnectorAnalytics, ConnectorService, CreateConnectorInput, CreatedConnector,
};
pub use gateway::{GatewayResponse, ProxyGateway};
pub use link_service::{CreateLinkInput, CreatedLink, LinkService};
