//! Request gate: decides pass-through or rejection for one request.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use super::clock::{Clock, SystemClock};
use super::identity::{IdentityResolver, RequestInfo};
use super::limiter::SlidingWindowLimiter;
use super::store::WindowStore;
use crate::config::{GateConfig, StoreFailurePolicy};

/// Error message returned to rejected callers.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Try again later.";

/// HTTP status code for rejected requests.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// A rejected request, serializable as the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// HTTP status to respond with
    #[serde(skip)]
    pub status: u16,
    /// Fixed error message
    pub error: String,
    /// Whole seconds the caller should wait
    pub retry_after: u64,
}

impl Rejection {
    pub fn new(retry_after: u64) -> Self {
        Self {
            status: TOO_MANY_REQUESTS,
            error: RATE_LIMIT_MESSAGE.to_string(),
            retry_after,
        }
    }
}

/// Outcome of [`RateLimitGate::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Hand the request on unchanged
    PassThrough,
    /// Answer with a rejection instead of handling the request
    Rejected(Rejection),
}

impl GateDecision {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, GateDecision::PassThrough)
    }
}

/// Rate limit gate placed in front of request handling.
///
/// Only paths under a protected prefix are limited. Requests that cannot be
/// attributed to any caller are let through.
pub struct RateLimitGate {
    protected_prefixes: Vec<String>,
    key_prefix: String,
    failure_policy: StoreFailurePolicy,
    resolver: IdentityResolver,
    limiter: SlidingWindowLimiter,
    clock: Arc<dyn Clock>,
}

impl RateLimitGate {
    /// Build a gate from configuration over the given store, using wall-clock
    /// time.
    pub fn new(config: &GateConfig, store: Arc<dyn WindowStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Build a gate with an explicit clock.
    pub fn with_clock(config: &GateConfig, store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            protected_prefixes: config.rate_limit_protected_prefixes.clone(),
            key_prefix: config.rate_limit_key_prefix.clone(),
            failure_policy: config.store_failure_policy,
            resolver: IdentityResolver::new(),
            limiter: SlidingWindowLimiter::new(
                store,
                config.rate_limit_requests,
                config.window_duration(),
            ),
            clock,
        }
    }

    /// Whether `path` falls under a protected prefix.
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Check `request` at the current time.
    pub async fn check(&self, request: &RequestInfo) -> GateDecision {
        self.check_at(request, self.clock.now()).await
    }

    /// Check `request` as if it arrived at `now` (epoch seconds).
    pub async fn check_at(&self, request: &RequestInfo, now: f64) -> GateDecision {
        let path = request.path_or_empty();
        if !self.is_protected(path) {
            trace!(path = %path, "Path not protected");
            return GateDecision::PassThrough;
        }

        let Some(identity) = self.resolver.resolve(request) else {
            debug!(path = %path, "No caller identity, letting request through");
            return GateDecision::PassThrough;
        };

        let key = format!("{}{}", self.key_prefix, identity);

        match self.limiter.admit(&key, now).await {
            Ok(result) if result.admitted => GateDecision::PassThrough,
            Ok(result) => {
                let retry_after = result
                    .retry_after
                    .unwrap_or_else(|| self.limiter.window().as_secs());
                debug!(
                    key = %key,
                    path = %path,
                    retry_after = retry_after,
                    "Request rejected"
                );
                GateDecision::Rejected(Rejection::new(retry_after))
            }
            Err(e) => match self.failure_policy {
                StoreFailurePolicy::FailOpen => {
                    warn!(key = %key, error = %e, "Window store failed, letting request through");
                    GateDecision::PassThrough
                }
                StoreFailurePolicy::FailClosed => {
                    error!(key = %key, error = %e, "Window store failed, rejecting request");
                    GateDecision::Rejected(Rejection::new(self.limiter.window().as_secs()))
                }
            },
        }
    }

    /// Get the underlying limiter.
    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }
}
