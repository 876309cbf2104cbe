//! HTTP server hosting a small application behind the gate.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::middleware::protect;
use crate::error::{GateError, Result};
use crate::ratelimit::RateLimitGate;

/// HTTP server fronted by a rate limit gate.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The gate every request passes through
    gate: Arc<RateLimitGate>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, gate: Arc<RateLimitGate>) -> Self {
        Self { addr, gate }
    }

    /// Build the router: the demo routes wrapped in tracing and the gate.
    pub fn router(&self) -> Router {
        let routes = Router::new()
            .route("/", get(index))
            .route("/api/status/", get(api_status))
            .route("/health/", get(health));

        protect(routes, self.gate.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GateError::Io(e)
        })
    }
}

async fn index() -> &'static str {
    "windowgate"
}

async fn api_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "windowgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
