//! Error types for admission control
use std::time::Duration;

/// Failure talking to the shared counter store.
///
/// Never surfaced to API callers: the principal limiter logs it and fails open.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("counter store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The call did not finish within the latency budget.
    #[error("counter store call timed out after {elapsed:?} (limit: {timeout:?})")]
    Timeout { elapsed: Duration, timeout: Duration },
    /// A stored value could not be decoded as a counter record.
    #[error("counter record at `{key}` is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    /// Wrap any backend error as `Unavailable`.
    pub fn unavailable<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unavailable(Box::new(err))
    }

    /// Check if this error is due to the store-call deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is a decode failure rather than a transport failure.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Errors produced when validating policies and admission configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A policy must allow at least one request.
    #[error("max_requests must be > 0 for `{operation}`")]
    ZeroLimit { operation: String },
    /// A policy window must be non-empty.
    #[error("window must be > 0 for `{operation}`")]
    ZeroWindow { operation: String },
    /// Windows longer than [`Policy::MAX_WINDOW`](crate::Policy::MAX_WINDOW) are rejected.
    #[error("window {window:?} for `{operation}` exceeds the maximum of {max:?}")]
    WindowTooLong { operation: String, window: Duration, max: Duration },
    /// The same method and path were configured twice.
    #[error("duplicate policy for `{operation}`")]
    DuplicatePolicy { operation: String },
    /// Records would expire before the window they track has closed.
    #[error("record ttl {ttl:?} is shorter than the largest window {window:?}")]
    TtlShorterThanWindow { ttl: Duration, window: Duration },
    /// A duration that must be positive was zero.
    #[error("`{field}` must be > 0")]
    ZeroDuration { field: &'static str },
    /// The configuration document could not be parsed.
    #[error("invalid admission config: {0}")]
    Parse(String),
}
