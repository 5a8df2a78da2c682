use std::fmt;
use std::time::Duration;

/// Which limiter produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Counted per authenticated principal and operation.
    Principal {
        /// Principal id as resolved by the identity layer
        principal: String,
        /// `"<METHOD> <path>"`
        operation: String,
    },
    /// Counted per network origin.
    Origin {
        /// Client address or other origin identifier
        origin: String,
    },
}

/// Admission events emitted by the middleware.
///
/// Events can be collected, aggregated, and forwarded to metrics or audit systems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionEvent {
    /// A request was admitted and counted.
    Allowed {
        scope: Scope,
        /// Requests counted in the window, this one included
        current_count: u32,
        /// Window budget
        limit: u32,
    },
    /// A request was rejected with 429.
    Denied {
        scope: Scope,
        /// Requests counted in the window
        current_count: u32,
        /// Window budget
        limit: u32,
        /// Value sent in `Retry-After`
        retry_after: Duration,
    },
    /// The counter store failed and the request was admitted without a reliable count.
    FailOpen {
        scope: Scope,
    },
}

impl AdmissionEvent {
    pub fn scope(&self) -> &Scope {
        match self {
            AdmissionEvent::Allowed { scope, .. }
            | AdmissionEvent::Denied { scope, .. }
            | AdmissionEvent::FailOpen { scope } => scope,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AdmissionEvent::Denied { .. })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Principal { principal, operation } => {
                write!(f, "principal={} op={}", principal, operation)
            }
            Scope::Origin { origin } => write!(f, "origin={}", origin),
        }
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionEvent::Allowed { scope, current_count, limit } => {
                write!(f, "Allowed({}, {}/{})", scope, current_count, limit)
            }
            AdmissionEvent::Denied { scope, current_count, limit, retry_after } => {
                write!(
                    f,
                    "Denied({}, {}/{}, retry_after={:?})",
                    scope, current_count, limit, retry_after
                )
            }
            AdmissionEvent::FailOpen { scope } => write!(f, "FailOpen({})", scope),
        }
    }
}
