//! Fixed-window admission control.
//!
//! This module provides the building blocks for per-request admission:
//! - [`PrincipalLimiter`]: windows per (principal, operation), state in a shared [`CounterStore`].
//! - [`OriginLimiter`]: windows per network origin, state in an in-process [`OriginTable`].
//! - [`AdmissionLayer`] / [`OriginLimitLayer`]: tower middleware applying the decisions.
//! - [`Sweeper`]: periodic eviction of stale origin records.
//! - [`Decision`]: the result of a check (allowed/denied plus quota metadata).
//!
//! # Architecture
//!
//! - **Middleware** knows nothing about windows; it asks a limiter and renders the
//!   [`Decision`] as headers or a 429 response.
//! - **Logic** is the same fixed-window-with-lazy-reset rule for both limiters: a window
//!   opens on the first request after the previous one expired, denied requests never
//!   consume quota.
//! - **Storage** is behind [`CounterStore`] for the principal path so any remote
//!   key-value store with TTLs can back it. Store failures fail open.
//!
//! [`CounterStore`]: store::CounterStore

use crate::clock::duration_millis;
use crate::policy::Policy;
use std::time::Duration;

pub mod middleware;
pub mod origin;
pub mod principal;
pub mod response;
pub mod store;
pub mod sweeper;

pub use middleware::{AdmissionLayer, AdmissionService, Origin, OriginLimitLayer, OriginLimitService, Principal};
pub use origin::{OriginLimiter, OriginRecord, OriginTable};
pub use principal::PrincipalLimiter;
pub use response::QuotaExceeded;
pub use store::{CounterRecord, CounterStore, InMemoryCounterStore};
pub use sweeper::{Sweeper, SweeperHandle};

/// The decision returned by a limiter for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The window budget (`X-RateLimit-Limit`).
    pub limit: u32,
    /// Requests left in the window after this one (`X-RateLimit-Remaining`).
    pub remaining: u32,
    /// Epoch millis at which the current window closes.
    pub reset_at_millis: u64,
    /// Requests counted in the window, including this one when allowed.
    pub current_count: u32,
    /// Set when the counter store failed and the request was let through unchecked.
    pub degraded: bool,
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Whole seconds until the window resets, rounded up and never below one second.
    ///
    /// Used for `Retry-After`.
    pub fn retry_after(&self, now_millis: u64) -> Duration {
        let wait_millis = self.reset_at_millis.saturating_sub(now_millis);
        Duration::from_secs(wait_millis.div_ceil(1000).max(1))
    }

    /// Reset instant in epoch seconds, rounded up.
    pub fn reset_at_secs(&self) -> u64 {
        self.reset_at_millis.div_ceil(1000)
    }

    /// Allow-without-counting decision used when the store cannot be consulted.
    pub(crate) fn fail_open(policy: &Policy, now_millis: u64) -> Self {
        let limit = policy.max_requests();
        Self {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(1),
            reset_at_millis: now_millis.saturating_add(duration_millis(policy.window())),
            current_count: 1,
            degraded: true,
        }
    }
}

/// Outcome of applying the fixed-window rule to previously stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowOutcome {
    pub decision: Decision,
    /// `(count, window_start_millis)` to persist, `None` when nothing changes.
    pub commit: Option<(u32, u64)>,
}

/// Fixed window with lazy reset.
///
/// `prior` is the stored `(count, window_start_millis)`, if any. A missing or expired
/// window is replaced by a fresh one starting at `now_millis`; the fresh window is never
/// read back from storage. At or above the limit the request is denied and nothing is
/// committed.
pub(crate) fn fixed_window(
    max_requests: u32,
    window: Duration,
    prior: Option<(u32, u64)>,
    now_millis: u64,
) -> WindowOutcome {
    let window_millis = duration_millis(window);
    let (current, window_start) = match prior {
        Some((count, start)) if now_millis.saturating_sub(start) < window_millis => (count, start),
        _ => (0, now_millis),
    };
    let reset_at_millis = window_start.saturating_add(window_millis);

    if current >= max_requests {
        return WindowOutcome {
            decision: Decision {
                allowed: false,
                limit: max_requests,
                remaining: 0,
                reset_at_millis,
                current_count: current,
                degraded: false,
            },
            commit: None,
        };
    }

    let next = current + 1;
    WindowOutcome {
        decision: Decision {
            allowed: true,
            limit: max_requests,
            remaining: max_requests - next,
            reset_at_millis,
            current_count: next,
            degraded: false,
        },
        commit: Some((next, window_start)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn first_request_opens_window() {
        let out = fixed_window(3, MINUTE, None, 1_000);
        assert!(out.decision.allowed);
        assert_eq!(out.decision.remaining, 2);
        assert_eq!(out.decision.current_count, 1);
        assert_eq!(out.decision.reset_at_millis, 61_000);
        assert_eq!(out.commit, Some((1, 1_000)));
    }

    #[test]
    fn at_limit_denies_without_commit() {
        let out = fixed_window(3, MINUTE, Some((3, 1_000)), 5_000);
        assert!(!out.decision.allowed);
        assert_eq!(out.decision.remaining, 0);
        assert_eq!(out.decision.current_count, 3);
        assert_eq!(out.commit, None);
    }

    #[test]
    fn expired_window_resets_exactly_at_boundary() {
        let out = fixed_window(3, MINUTE, Some((3, 1_000)), 61_000);
        assert!(out.decision.allowed);
        assert_eq!(out.decision.current_count, 1);
        assert_eq!(out.commit, Some((1, 61_000)));
    }

    #[test]
    fn window_start_in_future_is_kept() {
        // clock skew between processes: another node opened the window "later"
        let out = fixed_window(3, MINUTE, Some((1, 10_000)), 9_000);
        assert_eq!(out.commit, Some((2, 10_000)));
    }

    #[test]
    fn retry_after_rounds_up_and_floors_at_one_second() {
        let d = fixed_window(1, MINUTE, Some((1, 0)), 59_001).decision;
        assert_eq!(d.retry_after(59_001), Duration::from_secs(1));
        assert_eq!(d.retry_after(58_500), Duration::from_secs(2));
        assert_eq!(d.retry_after(70_000), Duration::from_secs(1));
        assert_eq!(d.reset_at_secs(), 60);
    }

    #[test]
    fn fail_open_reports_one_request_counted() {
        let policy = Policy::new(10, MINUTE).unwrap();
        let d = Decision::fail_open(&policy, 0);
        assert!(d.allowed && d.degraded);
        assert_eq!(d.remaining, 9);
        assert_eq!(d.current_count, 1);
        assert_eq!(d.reset_at_millis, 60_000);
    }
}
