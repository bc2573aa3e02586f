//! HTTP surface: management API, gateway endpoints, and OpenAPI docs.

pub mod docs;
pub mod error;
pub mod gateway_handlers;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, build_router_with_options, ApiState};
pub use server::start_api_server;
