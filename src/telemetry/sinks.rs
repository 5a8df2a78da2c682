use super::events::{AdmissionEvent, Scope};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::future::{ready, Future, Ready};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};

/// Any `tower::Service<AdmissionEvent>` the admission layers can report to.
///
/// Implemented for every service with a unit response, a `Send` future and an
/// error type; there is nothing to implement by hand.
pub trait TelemetrySink:
    Service<AdmissionEvent, Response = (), Error = Self::SinkError, Future = Self::SinkFuture>
    + Clone
    + Send
    + 'static
{
    type SinkError: std::error::Error + Send + 'static;
    type SinkFuture: Future<Output = Result<(), Self::SinkError>> + Send + 'static;
}

impl<T> TelemetrySink for T
where
    T: Service<AdmissionEvent, Response = ()> + Clone + Send + 'static,
    T::Error: std::error::Error + Send + 'static,
    T::Future: Send + 'static,
{
    type SinkError = T::Error;
    type SinkFuture = T::Future;
}

/// Deliver one event, dropping it if the sink is not ready or fails.
///
/// Runs inline with the request, so a sink should answer quickly.
pub async fn emit_best_effort<T: TelemetrySink>(sink: T, event: AdmissionEvent) {
    match sink.oneshot(event).await {
        Ok(()) => {}
        Err(error) => tracing::trace!(error = %error, "admission event dropped"),
    }
}

/// Discards every event. The default sink of both layers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl Service<AdmissionEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: AdmissionEvent) -> Self::Future {
        ready(Ok(()))
    }
}

/// Writes events as structured `tracing` records under the `turnstile::admission` target.
///
/// Admissions log at `trace`, denials at `info`, fail-open admissions at `warn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Service<AdmissionEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: AdmissionEvent) -> Self::Future {
        match &event {
            AdmissionEvent::Allowed { scope, current_count, limit } => tracing::trace!(
                target: "turnstile::admission",
                scope = %scope,
                count = current_count,
                limit = limit,
                "admitted"
            ),
            AdmissionEvent::Denied { scope, current_count, limit, retry_after } => tracing::info!(
                target: "turnstile::admission",
                scope = %scope,
                count = current_count,
                limit = limit,
                retry_after_secs = retry_after.as_secs(),
                "denied"
            ),
            AdmissionEvent::FailOpen { scope } => tracing::warn!(
                target: "turnstile::admission",
                scope = %scope,
                "admitted without counting"
            ),
        }
        ready(Ok(()))
    }
}

/// Outcome counts for one [`Scope`] (or for all of them, see [`MemorySink::totals`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub allowed: u64,
    pub denied: u64,
    pub fail_open: u64,
}

impl Tally {
    fn record(&mut self, event: &AdmissionEvent) {
        match event {
            AdmissionEvent::Allowed { .. } => self.allowed += 1,
            AdmissionEvent::Denied { .. } => self.denied += 1,
            AdmissionEvent::FailOpen { .. } => self.fail_open += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.allowed + self.denied + self.fail_open
    }
}

#[derive(Debug, Default)]
struct Recorded {
    recent: VecDeque<AdmissionEvent>,
    tallies: HashMap<Scope, Tally>,
}

/// In-memory sink for tests and debugging endpoints.
///
/// Keeps the last `capacity` events in order, and per-scope tallies of every event ever
/// seen (tallies are not bounded by `capacity`). Clones share state.
#[derive(Clone, Debug)]
pub struct MemorySink {
    recorded: Arc<Mutex<Recorded>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { recorded: Arc::new(Mutex::new(Recorded::default())), capacity: capacity.max(1) }
    }

    /// Most recent events, oldest first.
    pub fn events(&self) -> Vec<AdmissionEvent> {
        self.lock().recent.iter().cloned().collect()
    }

    /// Counts for one principal/operation pair or origin.
    pub fn tally(&self, scope: &Scope) -> Tally {
        self.lock().tallies.get(scope).copied().unwrap_or_default()
    }

    /// Counts across all scopes.
    pub fn totals(&self) -> Tally {
        self.lock().tallies.values().fold(Tally::default(), |acc, t| Tally {
            allowed: acc.allowed + t.allowed,
            denied: acc.denied + t.denied,
            fail_open: acc.fail_open + t.fail_open,
        })
    }

    /// Scopes with at least one denial, most denied first.
    pub fn most_denied(&self) -> Vec<(Scope, u64)> {
        let mut denied: Vec<_> = self
            .lock()
            .tallies
            .iter()
            .filter(|(_, t)| t.denied > 0)
            .map(|(scope, t)| (scope.clone(), t.denied))
            .collect();
        denied.sort_by(|a, b| b.1.cmp(&a.1));
        denied
    }

    pub fn clear(&self) {
        let mut recorded = self.lock();
        recorded.recent.clear();
        recorded.tallies.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().recent.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<AdmissionEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: AdmissionEvent) -> Self::Future {
        let mut recorded = self.lock();
        recorded.tallies.entry(event.scope().clone()).or_default().record(&event);
        if recorded.recent.len() == self.capacity {
            recorded.recent.pop_front();
        }
        recorded.recent.push_back(event);
        ready(Ok(()))
    }
}
