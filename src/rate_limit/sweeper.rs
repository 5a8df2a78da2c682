use crate::clock::{duration_millis, Clock, SystemClock};
use crate::rate_limit::origin::OriginTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Default age after which an origin record is reclaimed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(60 * 60);

/// Evicts stale records from an [`OriginTable`].
///
/// A record is removed once `max(grace, record.window)` has passed since its window
/// opened. Safe to run concurrently with checks: evicting a record that was just
/// touched only makes its next request open a fresh window.
#[derive(Clone, Debug)]
pub struct Sweeper {
    table: OriginTable,
    clock: Arc<dyn Clock>,
    grace: Duration,
}

impl Sweeper {
    pub fn new(table: OriginTable) -> Self {
        Self { table, clock: Arc::new(SystemClock), grace: DEFAULT_GRACE }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// One pass over the table. Returns the number of evicted records.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let grace = self.grace;
        let removed = self.table.retain(|record| {
            let max_age = duration_millis(grace.max(record.window));
            now.saturating_sub(record.window_start_millis) < max_age
        });
        tracing::debug!(removed, remaining = self.table.len(), "origin sweep");
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current tokio runtime.
    ///
    /// Panics if `interval` is zero.
    pub fn spawn(self, interval: Duration) -> SweeperHandle {
        assert!(!interval.is_zero(), "sweep interval must be non-zero");
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(?interval, grace = ?self.grace, "origin sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            tracing::info!("origin sweeper stopped");
        });
        SweeperHandle { shutdown: Some(shutdown_tx), task }
    }
}

/// Handle to a background sweeper task.
///
/// Dropping the handle stops the task at its next wake-up.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait for it to finish.
    pub async fn shutdown(self) {
        let SweeperHandle { shutdown, task } = self;
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }
        if let Err(error) = task.await {
            tracing::warn!(error = %error, "origin sweeper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
