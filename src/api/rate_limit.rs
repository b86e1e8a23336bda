//! Rate Limit Response
//!
//! Body shape returned alongside HTTP 429.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parsed body of a 429 response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitBody {
    /// Human-readable explanation
    #[serde(default)]
    pub message: String,

    /// Seconds to wait before the quota frees up
    #[serde(default)]
    pub retry_after: Option<f64>,

    /// Whether the limit is global rather than scoped to a route.
    /// Accepted but not acted on; both cases engage the same gate.
    #[serde(default)]
    pub global: bool,
}

impl RateLimitBody {
    /// Parse leniently; an unreadable body is treated as carrying no hints
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Wait requested by upstream, from the body or else the `Retry-After` header
    pub fn retry_after(&self, headers: &HeaderMap) -> Duration {
        self.retry_after
            .and_then(seconds_to_duration)
            .or_else(|| {
                headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .and_then(seconds_to_duration)
            })
            .unwrap_or(Duration::ZERO)
    }
}

fn seconds_to_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_rate_limit_body() {
        let body = RateLimitBody::parse(
            br#"{"message": "You are being rate limited.", "retry_after": 2.5, "global": true}"#,
        );

        assert_eq!(body.message, "You are being rate limited.");
        assert!(body.global);
        assert_eq!(
            body.retry_after(&HeaderMap::new()),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_falls_back_to_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));

        let body = RateLimitBody::parse(b"not json");
        assert_eq!(body, RateLimitBody::default());
        assert_eq!(body.retry_after(&headers), Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_negative_retry_after() {
        let body = RateLimitBody::parse(br#"{"retry_after": -1.0}"#);
        assert_eq!(body.retry_after(&HeaderMap::new()), Duration::ZERO);
    }
}
