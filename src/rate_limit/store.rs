use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared per-(principal, operation) window state.
///
/// `window_start_millis` only changes when a new window opens; `count` never decreases
/// within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub count: u32,
    pub window_start_millis: u64,
}

/// Abstract storage interface for window counters.
///
/// Designed for remote key-value stores with per-key TTLs. Each call is a single
/// best-effort attempt: adapters must not retry, and must report transport problems as
/// errors rather than as a missing record.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Fetch the record for `key`, `Ok(None)` if absent or expired.
    async fn read(&self, key: &str) -> Result<Option<CounterRecord>, StoreError>;

    /// Overwrite the record for `key`, expiring it after `ttl`.
    ///
    /// Unconditional last-write-wins; concurrent writers may overwrite each other.
    async fn write(&self, key: &str, record: CounterRecord, ttl: Duration) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    async fn read(&self, key: &str) -> Result<Option<CounterRecord>, StoreError> {
        (**self).read(key).await
    }

    async fn write(&self, key: &str, record: CounterRecord, ttl: Duration) -> Result<(), StoreError> {
        (**self).write(key, record, ttl).await
    }
}

/// Simple in-memory counter store with TTL expiry.
///
/// Expired entries read as absent and are dropped lazily on access.
#[derive(Clone, Debug)]
pub struct InMemoryCounterStore {
    // key -> (record, expires_at_millis)
    data: Arc<Mutex<HashMap<String, (CounterRecord, u64)>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self { data: Arc::new(Mutex::new(HashMap::new())), clock: Arc::new(SystemClock) }
    }

    /// Override the clock used for expiry; share it with the limiter in tests.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Number of stored keys, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (CounterRecord, u64)>> {
        // a panic while holding the lock cannot leave a record half-written
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn read(&self, key: &str) -> Result<Option<CounterRecord>, StoreError> {
        let now = self.clock.now_millis();
        let mut guard = self.lock();
        match guard.get(key) {
            Some(&(record, expires_at)) if now < expires_at => Ok(Some(record)),
            Some(_) => {
                guard.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, record: CounterRecord, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.clock.now_millis().saturating_add(duration_millis(ttl));
        self.lock().insert(key.to_string(), (record, expires_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn write_then_read() {
        let store = InMemoryCounterStore::new();
        let record = CounterRecord { count: 2, window_start_millis: 5 };
        store.write("rate:u1:GET /", record, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.read("rate:u1:GET /").await.unwrap(), Some(record));
        assert_eq!(store.read("rate:u2:GET /").await.unwrap(), None);
    }

    #[tokio::test]
    async fn records_expire_after_ttl() {
        let clock = ManualClock::new(0);
        let store = InMemoryCounterStore::new().with_clock(clock.clone());
        let record = CounterRecord { count: 1, window_start_millis: 0 };
        store.write("k", record, Duration::from_secs(3600)).await.unwrap();

        clock.advance(Duration::from_secs(3599));
        assert!(store.read("k").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.read("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn arc_store_delegates() {
        let store = Arc::new(InMemoryCounterStore::new());
        let record = CounterRecord { count: 7, window_start_millis: 1 };
        CounterStore::write(&store, "k", record, Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn record_json_shape() {
        let json = serde_json::to_value(CounterRecord { count: 3, window_start_millis: 42 }).unwrap();
        assert_eq!(json, serde_json::json!({ "count": 3, "window_start_millis": 42 }));
    }
}
