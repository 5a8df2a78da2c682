//! Telemetry for admission decisions.
//!
//! The middleware emits an [`AdmissionEvent`] per limited request. Events flow through
//! [`TelemetrySink`] implementations, which are plain `tower::Service<AdmissionEvent>`s,
//! so they can log, aggregate, or forward to external systems.
//!
//! ```rust
//! use turnstile::telemetry::{AdmissionEvent, Scope};
//!
//! let denied = AdmissionEvent::Denied {
//!     scope: Scope::Origin { origin: "203.0.113.9".into() },
//!     current_count: 20,
//!     limit: 20,
//!     retry_after: std::time::Duration::from_secs(12),
//! };
//! assert!(denied.is_denied());
//! ```

pub mod events;
pub mod sinks;

pub use events::{AdmissionEvent, Scope};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, Tally, TelemetrySink};
