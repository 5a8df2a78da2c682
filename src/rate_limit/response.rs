//! Response contract: quota headers and the 429 rejection.

use crate::rate_limit::Decision;
use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::{Response, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

// 9999-12-31T23:59:59.999Z
const LATEST_RESET_MILLIS: i64 = 253_402_300_799_999;

/// Error code in the JSON body of every 429.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Write `X-RateLimit-Limit`, `-Remaining` and `-Reset` (epoch seconds), replacing any
/// values set further down the stack.
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at_secs()));
}

/// A denied request. The only admission error that reaches API callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub limit: u32,
    pub reset_at_millis: u64,
    pub retry_after: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotaExceededBody<'a> {
    code: &'a str,
    message: String,
    limit: u32,
    remaining: u32,
    reset_at: String,
}

impl QuotaExceeded {
    /// Build from a denied decision evaluated at `now_millis`.
    pub fn from_decision(decision: &Decision, now_millis: u64) -> Self {
        Self {
            limit: decision.limit,
            reset_at_millis: decision.reset_at_millis,
            retry_after: decision.retry_after(now_millis),
        }
    }

    /// `resetAt` as RFC 3339 / ISO-8601 in UTC, clamped to the last four-digit-year instant.
    pub fn reset_at_rfc3339(&self) -> String {
        let millis = i64::try_from(self.reset_at_millis)
            .unwrap_or(LATEST_RESET_MILLIS)
            .min(LATEST_RESET_MILLIS);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    }

    /// JSON body of the 429 response.
    pub fn body(&self) -> String {
        let body = QuotaExceededBody {
            code: RATE_LIMIT_EXCEEDED,
            message: self.to_string(),
            limit: self.limit,
            remaining: 0,
            reset_at: self.reset_at_rfc3339(),
        };
        // a struct of strings and integers always serializes
        serde_json::to_string(&body).unwrap_or_default()
    }

    /// Render as `429 Too Many Requests` with quota headers, `Retry-After` and the JSON body.
    pub fn into_response<B>(self) -> Response<B>
    where
        B: From<String>,
    {
        let mut response = Response::new(B::from(self.body()));
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at_millis.div_ceil(1000)));
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after.as_secs()));
        response
    }
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate limit of {} requests exceeded; retry in {} seconds",
            self.limit,
            self.retry_after.as_secs()
        )
    }
}

impl std::error::Error for QuotaExceeded {}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied() -> Decision {
        Decision {
            allowed: false,
            limit: 3,
            remaining: 0,
            reset_at_millis: 1_700_000_060_000,
            current_count: 3,
            degraded: false,
        }
    }

    #[test]
    fn headers_from_decision() {
        let mut headers = HeaderMap::new();
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from_static("999"));
        apply_quota_headers(&mut headers, &denied());
        assert_eq!(headers[&X_RATELIMIT_LIMIT], "3");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[&X_RATELIMIT_RESET], "1700000060");
    }

    #[test]
    fn rejection_response_contract() {
        let err = QuotaExceeded::from_decision(&denied(), 1_700_000_010_500);
        assert_eq!(err.retry_after, Duration::from_secs(50));

        let response: Response<String> = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "50");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "0");

        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["limit"], 3);
        assert_eq!(body["remaining"], 0);
        assert_eq!(body["resetAt"], "2023-11-14T22:14:20.000Z");
        assert!(body["message"].as_str().unwrap().contains("50 seconds"));
    }

    #[test]
    fn far_future_reset_stays_iso_8601() {
        let err = QuotaExceeded {
            limit: 1,
            reset_at_millis: u64::MAX,
            retry_after: Duration::from_secs(1),
        };
        assert_eq!(err.reset_at_rfc3339(), "9999-12-31T23:59:59.999Z");
    }
}
