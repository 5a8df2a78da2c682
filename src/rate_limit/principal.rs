use crate::clock::{Clock, SystemClock};
use crate::config::AdmissionConfig;
use crate::error::ConfigError;
use crate::policy::{OperationKey, PolicyTable};
use crate::rate_limit::store::{CounterRecord, CounterStore};
use crate::rate_limit::{fixed_window, Decision};
use crate::timeout::TimeoutPolicy;
use std::sync::Arc;
use std::time::Duration;

/// TTL written with every counter record; exceeds every configured window.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(60 * 60);

/// Fixed-window limiter per (principal, operation), backed by a shared [`CounterStore`].
///
/// Each check performs one read and at most one write. The read-modify-write is not
/// atomic: two concurrent requests for the same key can read the same count and both
/// write `count + 1`, so one increment is lost. Under contention this under-counts,
/// it never over-counts, and no lock is taken.
///
/// Store errors and timeouts fail open (see [`Decision::degraded`]).
pub struct PrincipalLimiter<S> {
    store: Arc<S>,
    policies: Arc<PolicyTable>,
    clock: Arc<dyn Clock>,
    timeout: TimeoutPolicy,
    record_ttl: Duration,
}

impl<S> Clone for PrincipalLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policies: self.policies.clone(),
            clock: self.clock.clone(),
            timeout: self.timeout,
            record_ttl: self.record_ttl,
        }
    }
}

impl<S> std::fmt::Debug for PrincipalLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalLimiter")
            .field("policies", &self.policies.len())
            .field("timeout", &self.timeout.duration())
            .field("record_ttl", &self.record_ttl)
            .finish()
    }
}

impl<S> PrincipalLimiter<S>
where
    S: CounterStore + 'static,
{
    pub fn new(store: S, policies: PolicyTable) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(policies))
    }

    /// Build from already shared handles (e.g. one store for several limiters).
    ///
    /// The record TTL starts at [`DEFAULT_RECORD_TTL`], raised to the largest window in
    /// `policies` when that is longer.
    pub fn from_shared(store: Arc<S>, policies: Arc<PolicyTable>) -> Self {
        let record_ttl = DEFAULT_RECORD_TTL.max(policies.max_window());
        Self {
            store,
            policies,
            clock: Arc::new(SystemClock),
            timeout: TimeoutPolicy::default(),
            record_ttl,
        }
    }

    /// Build from a validated [`AdmissionConfig`]: its policy table, store timeout and
    /// record TTL.
    pub fn from_config(store: S, config: &AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(store, config.policy_table()?)
            .with_store_timeout(config.store_timeout())
            .with_record_ttl(config.record_ttl())
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Bound each store call. Panics if zero, like [`TimeoutPolicy::new`].
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = TimeoutPolicy::new(timeout);
        self
    }

    /// TTL for written records.
    ///
    /// Errors if `ttl` is shorter than the largest policy window: a record must not
    /// expire while its window is open.
    pub fn with_record_ttl(mut self, ttl: Duration) -> Result<Self, ConfigError> {
        let window = self.policies.max_window();
        if ttl < window {
            return Err(ConfigError::TtlShorterThanWindow { ttl, window });
        }
        self.record_ttl = ttl;
        Ok(self)
    }

    pub fn record_ttl(&self) -> Duration {
        self.record_ttl
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Store key for a principal and operation: `rate:<principal>:<operation>`.
    pub fn counter_key(principal: &str, operation: &OperationKey) -> String {
        format!("rate:{}:{}", principal, operation)
    }

    /// Decide whether `principal` may perform `operation` now.
    pub async fn check(&self, principal: &str, operation: &OperationKey) -> Decision {
        let policy = self.policies.resolve(operation);
        let key = Self::counter_key(principal, operation);
        let now = self.clock.now_millis();

        let prior = match self.timeout.execute(self.store.read(&key)).await {
            Ok(record) => record.map(|r| (r.count, r.window_start_millis)),
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "counter read failed; failing open");
                return Decision::fail_open(policy, now);
            }
        };

        let outcome = fixed_window(policy.max_requests(), policy.window(), prior, now);
        let mut decision = outcome.decision;

        if let Some((count, window_start_millis)) = outcome.commit {
            let record = CounterRecord { count, window_start_millis };
            if let Err(error) =
                self.timeout.execute(self.store.write(&key, record, self.record_ttl)).await
            {
                tracing::warn!(key = %key, error = %error, "counter write failed; request allowed");
                decision.degraded = true;
            }
        } else {
            tracing::debug!(
                key = %key,
                count = decision.current_count,
                limit = decision.limit,
                "quota exhausted"
            );
        }

        decision
    }
}
