use crate::clock::{Clock, SystemClock};
use crate::rate_limit::{fixed_window, Decision};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Window state for one network origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginRecord {
    pub count: u32,
    pub window_start_millis: u64,
    /// Window length the record was opened with; the sweeper never evicts a live window.
    pub window: Duration,
}

/// Process-local map of origin → window state.
///
/// Cloning yields another handle to the same map. Construct one per process and hand it
/// to both the [`OriginLimiter`] and the [`Sweeper`](crate::rate_limit::Sweeper).
///
/// State does not survive restarts and is not shared between processes, so with N
/// instances an origin can be admitted up to N times its configured budget.
#[derive(Clone, Debug, Default)]
pub struct OriginTable {
    entries: Arc<DashMap<String, OriginRecord>>,
}

impl OriginTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, origin: &str) -> Option<OriginRecord> {
        self.entries.get(origin).map(|entry| *entry)
    }

    /// Seed or replace a record directly.
    pub fn insert(&self, origin: impl Into<String>, record: OriginRecord) {
        self.entries.insert(origin.into(), record);
    }

    /// Keep only records for which `keep` returns true; returns how many were removed.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&OriginRecord) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| keep(record));
        before.saturating_sub(self.entries.len())
    }

    fn apply(&self, origin: &str, max_requests: u32, window: Duration, now: u64) -> Decision {
        // the shard lock is held for the whole read-modify-write, so checks for one
        // origin are serialized within the process
        let mut entry = self.entries.entry(origin.to_string()).or_insert(OriginRecord {
            count: 0,
            window_start_millis: now,
            window,
        });
        let prior = (entry.count > 0).then_some((entry.count, entry.window_start_millis));
        let outcome = fixed_window(max_requests, window, prior, now);
        if let Some((count, window_start_millis)) = outcome.commit {
            *entry = OriginRecord { count, window_start_millis, window };
        }
        outcome.decision
    }
}

/// In-process fixed-window limiter keyed by network origin.
///
/// For traffic that cannot be attributed to a principal yet. Never suspends and has no
/// failure mode.
#[derive(Clone, Debug)]
pub struct OriginLimiter {
    table: OriginTable,
    clock: Arc<dyn Clock>,
}

impl OriginLimiter {
    pub fn new(table: OriginTable) -> Self {
        Self { table, clock: Arc::new(SystemClock) }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn table(&self) -> &OriginTable {
        &self.table
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Count a request from `origin` against `max_requests` per `window`.
    pub fn check(&self, origin: &str, max_requests: u32, window: Duration) -> Decision {
        let now = self.clock.now_millis();
        let decision = self.table.apply(origin, max_requests, window, now);
        if !decision.allowed {
            tracing::debug!(origin = %origin, count = decision.current_count, "origin quota exhausted");
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter() -> (OriginLimiter, ManualClock) {
        let clock = ManualClock::new(10_000);
        (OriginLimiter::new(OriginTable::new()).with_clock(clock.clone()), clock)
    }

    #[test]
    fn denies_after_limit_without_incrementing() {
        let (limiter, _) = limiter();
        assert!(limiter.check("10.0.0.1", 2, MINUTE).allowed);
        assert!(limiter.check("10.0.0.1", 2, MINUTE).allowed);
        for _ in 0..5 {
            let d = limiter.check("10.0.0.1", 2, MINUTE);
            assert!(!d.allowed);
            assert_eq!(d.current_count, 2);
        }
        assert_eq!(limiter.table().get("10.0.0.1").map(|r| r.count), Some(2));
    }

    #[test]
    fn window_reopens_after_expiry() {
        let (limiter, clock) = limiter();
        assert!(limiter.check("a", 1, MINUTE).allowed);
        assert!(!limiter.check("a", 1, MINUTE).allowed);
        clock.advance(MINUTE);
        let d = limiter.check("a", 1, MINUTE);
        assert!(d.allowed);
        assert_eq!(d.reset_at_millis, 10_000 + 120_000);
    }

    #[test]
    fn denied_first_request_leaves_no_count() {
        // max_requests = 0 cannot come from a validated Policy, but the map must stay sane
        let (limiter, _) = limiter();
        assert!(!limiter.check("b", 0, MINUTE).allowed);
        assert_eq!(limiter.table().get("b").map(|r| r.count), Some(0));
    }
}
