//! Axum middleware that runs every request through the gate.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::ratelimit::{AuthenticatedIdentity, GateDecision, RateLimitGate, Rejection, RequestInfo};

/// Header carrying the client address chain set by proxies.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Wrap `router` so every route is checked by `gate`.
///
/// Authentication layers that run before this one can attribute requests to
/// a user by inserting an [`AuthenticatedIdentity`] into the request
/// extensions. The peer address is taken from `ConnectInfo<SocketAddr>`,
/// which requires serving with `into_make_service_with_connect_info`.
pub fn protect(router: Router, gate: Arc<RateLimitGate>) -> Router {
    router.layer(middleware::from_fn_with_state(gate, rate_limit))
}

/// Middleware function; see [`protect`].
pub async fn rate_limit(
    State(gate): State<Arc<RateLimitGate>>,
    request: Request,
    next: Next,
) -> Response {
    match gate.check(&request_info(&request)).await {
        GateDecision::PassThrough => next.run(request).await,
        GateDecision::Rejected(rejection) => rejection.into_response(),
    }
}

/// Extract the fields the gate needs from an HTTP request.
///
/// Headers that are not valid UTF-8 are ignored rather than rejected.
pub fn request_info(request: &Request) -> RequestInfo {
    let forwarded_for = request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let remote_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestInfo {
        path: Some(request.uri().path().to_string()),
        remote_address,
        forwarded_for,
        identity: request.extensions().get::<AuthenticatedIdentity>().cloned(),
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
        (
            status,
            [(header::RETRY_AFTER, self.retry_after.to_string())],
            Json(self),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::ratelimit::MemoryStore;
    use axum::{body::Body, routing::get};
    use tower::ServiceExt;

    fn test_app(quota: u32) -> Router {
        let config = GateConfig {
            rate_limit_requests: quota,
            ..Default::default()
        };
        let gate = Arc::new(RateLimitGate::new(&config, Arc::new(MemoryStore::new())));
        let router = Router::new()
            .route("/api/items/", get(|| async { "items" }))
            .route("/public", get(|| async { "public" }));
        protect(router, gate)
    }

    fn get_from(uri: &str, peer: &str) -> Request {
        let mut request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_after_quota() {
        let app = test_app(2);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get_from("/api/items/", "10.0.0.1:5000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(get_from("/api/items/", "10.0.0.1:5001"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let retry_header: u64 = response
            .headers()
            .get(header::RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_header > 0 && retry_header <= 60);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Rate limit exceeded. Try again later.");
        assert_eq!(body["retry_after"], retry_header);
    }

    #[tokio::test]
    async fn test_unprotected_route_is_never_limited() {
        let app = test_app(1);

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(get_from("/public", "10.0.0.1:5000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_forwarded_for_identifies_client() {
        let app = test_app(1);

        let mut first = get_from("/api/items/", "10.0.0.1:5000");
        first
            .headers_mut()
            .insert(FORWARDED_FOR, "198.51.100.7, 10.0.0.1".parse().unwrap());
        let response = app.clone().oneshot(first).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Same proxy, different client.
        let mut second = get_from("/api/items/", "10.0.0.1:5000");
        second
            .headers_mut()
            .insert(FORWARDED_FOR, "198.51.100.8".parse().unwrap());
        let response = app.clone().oneshot(second).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut third = get_from("/api/items/", "10.9.9.9:5000");
        third
            .headers_mut()
            .insert(FORWARDED_FOR, " 198.51.100.7 ".parse().unwrap());
        let response = app.clone().oneshot(third).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_authenticated_identity_extension() {
        let app = test_app(1);

        let mut request = get_from("/api/items/", "10.0.0.1:5000");
        request.extensions_mut().insert(AuthenticatedIdentity::new("42"));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The user's quota is spent but the address still has its own.
        let response = app
            .clone()
            .oneshot(get_from("/api/items/", "10.0.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut request = get_from("/api/items/", "10.0.0.2:5000");
        request.extensions_mut().insert(AuthenticatedIdentity::new("42"));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_request_without_address_passes() {
        let app = test_app(1);

        for _ in 0..3 {
            let request = axum::http::Request::builder()
                .uri("/api/items/")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[test]
    fn test_request_info_extraction() {
        let mut request = get_from("/api/items/?page=2", "[::1]:8080");
        request
            .headers_mut()
            .insert(FORWARDED_FOR, "203.0.113.1".parse().unwrap());

        let info = request_info(&request);
        assert_eq!(info.path.as_deref(), Some("/api/items/"));
        assert_eq!(info.remote_address.as_deref(), Some("::1"));
        assert_eq!(info.forwarded_for.as_deref(), Some("203.0.113.1"));
        assert!(info.identity.is_none());
    }
}
