//! Startup configuration for admission control.
//!
//! Loaded once (typically from a JSON file) and validated before any limiter is built.
//! There is no hot reload.
//!
//! ```rust
//! use turnstile::config::AdmissionConfig;
//!
//! let cfg = AdmissionConfig::from_json(r#"{
//!     "policies": [
//!         { "method": "POST", "path": "/api/resume/optimize", "max_requests": 10, "window_secs": 3600 }
//!     ]
//! }"#).unwrap();
//! assert_eq!(cfg.policy_table().unwrap().len(), 1);
//! ```

use crate::error::ConfigError;
use crate::policy::{OperationKey, Policy, PolicyTable};
use crate::rate_limit::principal::DEFAULT_RECORD_TTL;
use crate::rate_limit::sweeper::DEFAULT_GRACE;
use crate::timeout::DEFAULT_STORE_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `{max_requests, window_secs}` as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSpec {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl LimitSpec {
    fn to_policy(self, operation: &str) -> Result<Policy, ConfigError> {
        Policy::validated(self.max_requests, Duration::from_secs(self.window_secs), operation)
    }
}

/// One operation-specific entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLimit {
    pub method: String,
    pub path: String,
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Deadline per counter-store call.
    pub store_timeout_ms: u64,
    /// TTL written with every counter record.
    pub record_ttl_secs: u64,
    /// Minimum age before the sweeper evicts an origin record.
    pub origin_grace_secs: u64,
    /// Period of the origin sweeper.
    pub sweep_interval_secs: u64,
    /// Fallback for operations without an entry.
    pub default_policy: LimitSpec,
    pub policies: Vec<OperationLimit>,
    /// Budget applied per origin by the origin layer.
    pub origin_policy: LimitSpec,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: DEFAULT_STORE_TIMEOUT.as_millis() as u64,
            record_ttl_secs: DEFAULT_RECORD_TTL.as_secs(),
            origin_grace_secs: DEFAULT_GRACE.as_secs(),
            sweep_interval_secs: 300,
            default_policy: LimitSpec {
                max_requests: Policy::DEFAULT.max_requests(),
                window_secs: Policy::DEFAULT.window().as_secs(),
            },
            policies: Vec::new(),
            origin_policy: LimitSpec { max_requests: 20, window_secs: 60 },
        }
    }
}

impl AdmissionConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every invariant the limiters rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("store_timeout_ms", self.store_timeout_ms),
            ("record_ttl_secs", self.record_ttl_secs),
            ("origin_grace_secs", self.origin_grace_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        self.origin_policy()?;
        let table = self.policy_table()?;
        let ttl = self.record_ttl();
        let window = table.max_window();
        if ttl < window {
            return Err(ConfigError::TtlShorterThanWindow { ttl, window });
        }
        Ok(())
    }

    pub fn policy_table(&self) -> Result<PolicyTable, ConfigError> {
        let mut builder =
            PolicyTable::builder().default_policy(self.default_policy.to_policy("<default>")?);
        for entry in &self.policies {
            let key = OperationKey::from_parts(&entry.method, &entry.path);
            let spec = LimitSpec { max_requests: entry.max_requests, window_secs: entry.window_secs };
            builder = builder.operation(&entry.method, &entry.path, spec.to_policy(key.as_str())?);
        }
        builder.build()
    }

    pub fn origin_policy(&self) -> Result<Policy, ConfigError> {
        self.origin_policy.to_policy("<origin>")
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn origin_grace(&self) -> Duration {
        Duration::from_secs(self.origin_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = AdmissionConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.store_timeout(), Duration::from_millis(20));
        assert_eq!(cfg.record_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.policy_table().unwrap().default_policy(), &Policy::DEFAULT);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(AdmissionConfig::from_json("{}").unwrap(), AdmissionConfig::default());
    }

    #[test]
    fn parses_operation_entries() {
        let cfg = AdmissionConfig::from_json(
            r#"{
                "store_timeout_ms": 8,
                "policies": [
                    { "method": "post", "path": "/api/applications/", "max_requests": 30, "window_secs": 60 }
                ],
                "origin_policy": { "max_requests": 5, "window_secs": 10 }
            }"#,
        )
        .unwrap();
        let table = cfg.policy_table().unwrap();
        let policy = table.resolve(&OperationKey::from_parts("POST", "/api/applications"));
        assert_eq!(policy.max_requests(), 30);
        assert_eq!(cfg.origin_policy().unwrap().window(), Duration::from_secs(10));
        assert_eq!(cfg.store_timeout(), Duration::from_millis(8));
    }

    #[test]
    fn ttl_must_cover_largest_window() {
        let err = AdmissionConfig::from_json(
            r#"{ "policies": [ { "method": "GET", "path": "/x", "max_requests": 1, "window_secs": 7200 } ] }"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::TtlShorterThanWindow {
                ttl: Duration::from_secs(3600),
                window: Duration::from_secs(7200)
            }
        );
    }

    #[test]
    fn rejects_zero_limit_and_unknown_fields() {
        let zero = AdmissionConfig::from_json(
            r#"{ "policies": [ { "method": "GET", "path": "/x", "max_requests": 0, "window_secs": 60 } ] }"#,
        );
        assert_eq!(zero.unwrap_err(), ConfigError::ZeroLimit { operation: "GET /x".into() });

        let unknown = AdmissionConfig::from_json(r#"{ "hot_reload": true }"#);
        assert!(matches!(unknown, Err(ConfigError::Parse(_))));

        let zero_timeout = AdmissionConfig::from_json(r#"{ "store_timeout_ms": 0 }"#);
        assert_eq!(zero_timeout.unwrap_err(), ConfigError::ZeroDuration { field: "store_timeout_ms" });
    }
}
