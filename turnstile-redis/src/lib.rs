//! Redis counter store for `turnstile` (companion crate).
//! Bring your own `redis::aio::ConnectionManager`; records are stored as JSON strings
//! with a Redis-side expiry, so abandoned principals are reclaimed without deletes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use turnstile::{CounterRecord, CounterStore, StoreError};

#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").field("conn", &"<redis::aio::ConnectionManager>").finish()
    }
}

impl RedisCounterStore {
    /// Wrap an existing connection manager. Keys are used exactly as the limiter builds
    /// them (`rate:<principal>:<operation>`).
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn decode(key: &str, raw: &str) -> Result<CounterRecord, StoreError> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::Corrupt { key: key.to_string(), reason: e.to_string() })
}

fn encode(record: &CounterRecord) -> String {
    // two integer fields; serialization cannot fail
    serde_json::to_string(record).unwrap_or_default()
}

/// Redis expiries are whole seconds; round up so a record never outlives its window early.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs.max(1) }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn read(&self, key: &str) -> Result<Option<CounterRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(StoreError::unavailable)?;
        match raw {
            Some(raw) => decode(key, &raw).map(Some),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, record: CounterRecord, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, encode(&record), ttl_secs(ttl)).await.map_err(|e| {
            tracing::debug!(target: "turnstile::redis", key = %key, error = %e, "SET EX failed");
            StoreError::unavailable(e)
        })
    }
}
