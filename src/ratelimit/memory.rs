//! In-process window store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::store::WindowStore;
use crate::error::Result;

/// A stored window and the instant it stops being valid.
#[derive(Debug, Clone)]
struct WindowEntry {
    timestamps: Vec<f64>,
    expires_at: Instant,
}

/// Window store backed by a concurrent in-process map.
///
/// Expired entries are hidden from `get` immediately and removed either on
/// that `get` or by [`purge_expired`](MemoryStore::purge_expired).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, WindowEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Spawn a background task that purges expired entries every `interval`
    /// so keys that are never read again do not pile up.
    ///
    /// Returns the `JoinHandle` so callers can abort the task on shutdown.
    pub fn spawn_purge_task(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let removed = self.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = self.entries.len(), "Purged expired windows");
                }
            }
        })
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<f64>> {
        let now = Instant::now();

        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(entry.timestamps.clone()),
            Some(_) => {}
            None => return Ok(Vec::new()),
        }

        // The shard guard from the lookup above is released by now.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        trace!(key = %key, "Dropped expired window");
        Ok(Vec::new())
    }

    async fn set(&self, key: &str, timestamps: Vec<f64>, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            WindowEntry {
                timestamps,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
