#![forbid(unsafe_code)]

//! # Turnstile
//!
//! Admission control for multi-tenant HTTP APIs, as tower middleware.
//!
//! ## Features
//!
//! - **Per-principal fixed windows** per operation, counted in a shared key-value store
//!   with TTL expiry ([`PrincipalLimiter`], [`CounterStore`])
//! - **Per-origin fixed windows** in process memory for traffic that is not
//!   authenticated yet ([`OriginLimiter`], [`OriginTable`])
//! - **Fail open** when the store is slow or down: availability over strict enforcement
//! - **Static policy table** keyed by method + path with a global default ([`PolicyTable`])
//! - **Standard response contract**: `X-RateLimit-*` headers, `429` with `Retry-After`
//!   and a JSON error body
//! - **Background sweeper** that reclaims stale origin records ([`Sweeper`])
//!
//! ## Quick Start
//!
//! ```rust
//! use turnstile::{AdmissionLayer, InMemoryCounterStore, Policy, PolicyTable, PrincipalLimiter};
//! use std::time::Duration;
//!
//! let policies = PolicyTable::builder()
//!     .operation("POST", "/api/resume/optimize", Policy::new(10, Duration::from_secs(3600)).unwrap())
//!     .build()
//!     .unwrap();
//! let limiter = PrincipalLimiter::new(InMemoryCounterStore::new(), policies)
//!     .with_store_timeout(Duration::from_millis(20));
//! let layer = AdmissionLayer::new(limiter);
//! // ServiceBuilder::new().layer(layer).service(app)
//! # let _ = layer;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod policy;
pub mod prelude;
pub mod rate_limit;
pub mod telemetry;
pub mod timeout;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AdmissionConfig;
pub use error::{ConfigError, StoreError};
pub use policy::{OperationKey, Policy, PolicyTable, PolicyTableBuilder};
pub use rate_limit::{
    AdmissionLayer, AdmissionService, CounterRecord, CounterStore, Decision, InMemoryCounterStore,
    Origin, OriginLimitLayer, OriginLimitService, OriginLimiter, OriginRecord, OriginTable,
    Principal, PrincipalLimiter, QuotaExceeded, Sweeper, SweeperHandle,
};
pub use timeout::TimeoutPolicy;
