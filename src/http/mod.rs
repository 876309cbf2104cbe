//! HTTP integration: axum middleware and the demo server.

mod middleware;
mod server;

pub use middleware::{protect, rate_limit, request_info, FORWARDED_FOR};
pub use server::HttpServer;
