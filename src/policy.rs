//! Static per-operation limits.
//!
//! Each protected operation is identified by an [`OperationKey`] derived from the HTTP
//! method and path. A [`PolicyTable`] maps keys to [`Policy`] values and falls back to a
//! global default, so lookups never fail and new operations are added as data only.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Identifier of a protected action, `"<METHOD> <path>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationKey(String);

impl OperationKey {
    /// Build a key from a method and a request path.
    ///
    /// The method is upper-cased, any query string is dropped and a trailing `/` is
    /// trimmed (the root path stays `/`), so `get /api/jobs/?page=2` and `GET /api/jobs`
    /// name the same operation.
    ///
    /// ```
    /// use turnstile::OperationKey;
    /// let key = OperationKey::from_parts("post", "/api/resume/optimize/?draft=1");
    /// assert_eq!(key.as_str(), "POST /api/resume/optimize");
    /// ```
    pub fn from_parts(method: &str, path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        Self(format!("{} {}", method.trim().to_ascii_uppercase(), path))
    }

    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        Self::from_parts(req.method().as_str(), req.uri().path())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request budget for one operation: `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    max_requests: u32,
    window: Duration,
}

impl Policy {
    /// Global fallback: 100 requests per 15 minutes.
    pub const DEFAULT: Policy = Policy { max_requests: 100, window: Duration::from_secs(15 * 60) };

    /// Longest accepted window. Keeps every reset instant representable as a timestamp.
    pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

    /// Create a policy. Errors if `max_requests` or `window` is zero, or if `window`
    /// exceeds [`MAX_WINDOW`](Self::MAX_WINDOW).
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, ConfigError> {
        Self::validated(max_requests, window, "<policy>")
    }

    pub(crate) fn validated(
        max_requests: u32,
        window: Duration,
        operation: &str,
    ) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::ZeroLimit { operation: operation.to_string() });
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow { operation: operation.to_string() });
        }
        if window > Self::MAX_WINDOW {
            return Err(ConfigError::WindowTooLong {
                operation: operation.to_string(),
                window,
                max: Self::MAX_WINDOW,
            });
        }
        Ok(Self { max_requests, window })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Immutable operation → policy mapping with a global default.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: HashMap<OperationKey, Policy>,
    default: Policy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self { entries: HashMap::new(), default: Policy::DEFAULT }
    }
}

impl PolicyTable {
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder::default()
    }

    /// Exact operation entry, else the default. Never fails.
    pub fn resolve(&self, operation: &OperationKey) -> &Policy {
        self.entries.get(operation).unwrap_or(&self.default)
    }

    pub fn default_policy(&self) -> &Policy {
        &self.default
    }

    /// Largest window across all entries and the default.
    pub fn max_window(&self) -> Duration {
        self.entries.values().map(Policy::window).fold(self.default.window, Duration::max)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`PolicyTable`]; rejects duplicate operations.
#[derive(Debug, Default)]
pub struct PolicyTableBuilder {
    entries: HashMap<OperationKey, Policy>,
    default: Option<Policy>,
    error: Option<ConfigError>,
}

impl PolicyTableBuilder {
    /// Override the global default.
    pub fn default_policy(mut self, policy: Policy) -> Self {
        self.default = Some(policy);
        self
    }

    /// Declare the budget for one method + path.
    pub fn operation(mut self, method: &str, path: &str, policy: Policy) -> Self {
        let key = OperationKey::from_parts(method, path);
        if self.entries.contains_key(&key) {
            if self.error.is_none() {
                self.error = Some(ConfigError::DuplicatePolicy { operation: key.to_string() });
            }
        } else {
            self.entries.insert(key, policy);
        }
        self
    }

    pub fn build(self) -> Result<PolicyTable, ConfigError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(PolicyTable { entries: self.entries, default: self.default.unwrap_or_default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_key_normalizes_method_and_path() {
        assert_eq!(OperationKey::from_parts("get", "/api/jobs/").as_str(), "GET /api/jobs");
        assert_eq!(OperationKey::from_parts("GET", "/api/jobs?page=2").as_str(), "GET /api/jobs");
        assert_eq!(OperationKey::from_parts("DELETE", "/").as_str(), "DELETE /");
        assert_eq!(OperationKey::from_parts("GET", "").as_str(), "GET /");
    }

    #[test]
    fn operation_key_from_request() {
        let req = http::Request::post("https://api.example.com/api/applications/?x=1")
            .body(())
            .unwrap();
        assert_eq!(OperationKey::from_request(&req).as_str(), "POST /api/applications");
    }

    #[test]
    fn resolve_prefers_exact_entry() {
        let tight = Policy::new(5, Duration::from_secs(60)).unwrap();
        let table = PolicyTable::builder().operation("POST", "/api/resume/optimize", tight).build().unwrap();

        let hit = OperationKey::from_parts("POST", "/api/resume/optimize");
        let miss = OperationKey::from_parts("GET", "/api/resume/optimize");
        assert_eq!(*table.resolve(&hit), tight);
        assert_eq!(*table.resolve(&miss), Policy::DEFAULT);
    }

    #[test]
    fn default_is_100_per_15_minutes() {
        let table = PolicyTable::default();
        let policy = table.resolve(&OperationKey::from_parts("GET", "/anything"));
        assert_eq!(policy.max_requests(), 100);
        assert_eq!(policy.window(), Duration::from_secs(900));
    }

    #[test]
    fn zero_values_rejected() {
        assert!(matches!(Policy::new(0, Duration::from_secs(1)), Err(ConfigError::ZeroLimit { .. })));
        assert!(matches!(Policy::new(1, Duration::ZERO), Err(ConfigError::ZeroWindow { .. })));
    }

    #[test]
    fn oversized_window_rejected() {
        assert!(Policy::new(1, Policy::MAX_WINDOW).is_ok());
        assert_eq!(
            Policy::new(1, Duration::MAX).unwrap_err(),
            ConfigError::WindowTooLong {
                operation: "<policy>".into(),
                window: Duration::MAX,
                max: Policy::MAX_WINDOW,
            }
        );
    }

    #[test]
    fn duplicate_operations_rejected() {
        let p = Policy::new(1, Duration::from_secs(1)).unwrap();
        let err = PolicyTable::builder()
            .operation("GET", "/a", p)
            .operation("get", "/a/", p)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicatePolicy { operation: "GET /a".into() });
    }

    #[test]
    fn max_window_covers_default_and_entries() {
        let long = Policy::new(1, Duration::from_secs(7200)).unwrap();
        let table = PolicyTable::builder().operation("POST", "/x", long).build().unwrap();
        assert_eq!(table.max_window(), Duration::from_secs(7200));
        assert_eq!(PolicyTable::default().max_window(), Duration::from_secs(900));
    }
}
