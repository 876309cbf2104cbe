//! Window store trait for abstracting local and shared storage.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Storage for per-key timestamp windows.
///
/// A window is the ascending list of epoch-second timestamps of requests
/// admitted for one key. Implementations replace a key's whole list on
/// [`set`](WindowStore::set); that swap is the only atomicity the limiter
/// relies on, so no cross-key transactions are needed.
///
/// Process-local implementations keep independent counts per instance.
/// Deployments that run several instances and need a shared quota must use a
/// shared backend such as [`RedisStore`](super::RedisStore).
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Fetch the stored window for `key`, or an empty list if there is none.
    async fn get(&self, key: &str) -> Result<Vec<f64>>;

    /// Replace the window for `key`. The entry is discarded once `ttl` passes
    /// without another `set` on the same key.
    async fn set(&self, key: &str, timestamps: Vec<f64>, ttl: Duration) -> Result<()>;
}
