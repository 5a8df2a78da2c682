//! Convenient re-exports for common Turnstile types.
pub use crate::{
    clock::{Clock, SystemClock},
    config::AdmissionConfig,
    policy::{OperationKey, Policy, PolicyTable},
    rate_limit::{
        AdmissionLayer, CounterStore, Decision, InMemoryCounterStore, Origin, OriginLimitLayer,
        OriginLimiter, OriginTable, Principal, PrincipalLimiter, QuotaExceeded, Sweeper,
    },
    telemetry::{LogSink, MemorySink, NullSink, TelemetrySink},
    StoreError,
};
