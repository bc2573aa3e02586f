//! Repository layer for proxy gateway records
//!
//! One repository per table. Repositories translate between database rows
//! and domain types, and own the atomic counter updates the gateway relies
//! on under concurrency.

mod access_log;
mod connector;
mod link;

pub use access_log::{AccessLogRepository, AccessLogStats};
pub use connector::ConnectorRepository;
pub use link::LinkRepository;
