//! Redis-backed window store shared across gate instances.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::{info, trace};

use super::store::WindowStore;
use crate::error::{GateError, Result};

/// Window store backed by Redis.
///
/// Each window is stored as a JSON array under its key with `SET .. EX`, so
/// Redis owns expiry and every instance pointed at the same server shares
/// one count per key. Every round-trip is bounded by `operation_timeout`.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    operation_timeout: Duration,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str, operation_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = match tokio::time::timeout(
            operation_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(connection) => connection?,
            Err(_) => return Err(GateError::StoreTimeout(operation_timeout)),
        };

        info!(url = %url, "Connected window store to Redis");
        Ok(Self {
            connection,
            operation_timeout,
        })
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GateError::StoreTimeout(self.operation_timeout)),
        }
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Vec<f64>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = self.bounded(conn.get(key)).await?;
        trace!(key = %key, found = raw.is_some(), "Fetched window from Redis");
        decode_window(raw.as_deref())
    }

    async fn set(&self, key: &str, timestamps: Vec<f64>, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(&timestamps)?;
        let mut conn = self.connection.clone();
        self.bounded(conn.set_ex::<_, _, ()>(key, payload, ttl_seconds(ttl)))
            .await
    }
}

fn decode_window(raw: Option<&str>) -> Result<Vec<f64>> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(Vec::new()),
    }
}

/// Redis expiry is whole seconds and must be positive; round up.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
