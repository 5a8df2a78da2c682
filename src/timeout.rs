//! Deadline for counter-store calls

use crate::error::StoreError;
use std::future::Future;
use std::time::{Duration, Instant};

/// Default budget for a single store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self { duration: DEFAULT_STORE_TIMEOUT }
    }
}

impl TimeoutPolicy {
    /// Create a timeout policy. Panics if duration is zero or `Duration::MAX`.
    pub fn new(duration: Duration) -> Self {
        assert!(
            duration > Duration::ZERO && duration < Duration::MAX,
            "timeout duration must be non-zero and finite",
        );
        Self { duration }
    }

    /// Inspect the configured timeout duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Run one store call, mapping an elapsed deadline to [`StoreError::Timeout`].
    ///
    /// The inner future is dropped on timeout; a write that was already sent may still
    /// land, which the limiter tolerates.
    pub async fn execute<T, Fut>(&self, call: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let start = Instant::now();

        match tokio::time::timeout(self.duration, call).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed();
                Err(StoreError::Timeout { elapsed, timeout: self.duration })
            }
        }
    }
}
