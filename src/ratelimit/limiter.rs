//! Core sliding-window-log rate limiter.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::store::WindowStore;
use crate::error::Result;

/// Outcome of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitResult {
    /// Whether the request was admitted
    pub admitted: bool,
    /// Whole seconds until a slot frees up; set only on rejection
    pub retry_after: Option<u64>,
    /// Admits still available in the current window after this decision
    pub remaining: u32,
}

/// Sliding-window-log rate limiter.
///
/// For every key the store holds the timestamps of admitted requests. A
/// request is admitted when fewer than `quota` of them fall inside the
/// trailing `window`. Eviction is lazy: each decision compacts the list it
/// reads, and the store's TTL drops keys that go quiet.
///
/// The limiter keeps no state of its own between calls. Two admits racing
/// on the same key can both read the same list and both write, so a key may
/// overshoot its quota by at most the number of racers minus one.
pub struct SlidingWindowLimiter {
    /// Where windows live
    store: Arc<dyn WindowStore>,
    /// Maximum admitted requests per window
    quota: u32,
    /// Window length
    window: Duration,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `quota` requests per `window` for each key.
    pub fn new(store: Arc<dyn WindowStore>, quota: u32, window: Duration) -> Self {
        Self {
            store,
            quota,
            window,
        }
    }

    /// Decide whether a request for `key` at time `now` (epoch seconds) is
    /// admitted, recording it if so.
    ///
    /// Rejections leave the stored window untouched.
    pub async fn admit(&self, key: &str, now: f64) -> Result<AdmitResult> {
        let window_secs = self.window.as_secs_f64();
        let mut timestamps = self.store.get(key).await?;
        compact(&mut timestamps, now, window_secs);

        let count = timestamps.len();

        trace!(
            key = %key,
            count = count,
            quota = self.quota,
            "Checking sliding window"
        );

        if count >= self.quota as usize {
            let oldest = timestamps.iter().copied().fold(f64::INFINITY, f64::min);
            let retry_after = retry_after_secs(oldest, now, window_secs);

            debug!(
                key = %key,
                count = count,
                retry_after = retry_after,
                "Rate limit exceeded"
            );

            return Ok(AdmitResult {
                admitted: false,
                retry_after: Some(retry_after),
                remaining: 0,
            });
        }

        timestamps.push(now);
        let remaining = self.quota.saturating_sub(timestamps.len() as u32);
        self.store.set(key, timestamps, self.window).await?;

        Ok(AdmitResult {
            admitted: true,
            retry_after: None,
            remaining,
        })
    }

    /// Number of requests for `key` counted against the window at `now`.
    ///
    /// Read-only; does not record anything.
    pub async fn count(&self, key: &str, now: f64) -> Result<usize> {
        let mut timestamps = self.store.get(key).await?;
        compact(&mut timestamps, now, self.window.as_secs_f64());
        Ok(timestamps.len())
    }

    /// Get the quota.
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Drop timestamps that have slid out of the window. A timestamp exactly
/// `window_secs` old is out.
fn compact(timestamps: &mut Vec<f64>, now: f64, window_secs: f64) {
    timestamps.retain(|&t| now - t < window_secs);
}

/// Seconds until `oldest` leaves the window, rounded up and kept within
/// `1..=window`.
fn retry_after_secs(oldest: f64, now: f64, window_secs: f64) -> u64 {
    let wait = (window_secs - (now - oldest)).ceil();
    wait.clamp(1.0, window_secs.ceil().max(1.0)) as u64
}
