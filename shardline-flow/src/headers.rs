//! Rate-limit response headers.

use std::time::Duration;

use http::HeaderMap;

/// Header carrying the window's request limit.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Header carrying the requests left in the window.
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Header carrying seconds (fractional) until the window resets.
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Header naming the remote bucket the route belongs to.
pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";
/// Header set when the global limit was hit.
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";
/// Header carrying seconds to wait after a throttle response.
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Longest delay taken from a header; larger values are clamped.
pub const MAX_HEADER_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Rate-limit information reported by the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Requests allowed per window.
    pub limit: Option<u32>,
    /// Requests left in the window.
    pub remaining: Option<u32>,
    /// Time until the window resets.
    pub reset_after: Option<Duration>,
    /// Remote bucket identifier.
    pub bucket: Option<String>,
    /// Whether a throttle applies to the global limit.
    pub global: bool,
    /// Time to wait after a throttle response.
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parses rate-limit headers, ignoring anything malformed.
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        Self {
            limit: header_str(headers, HEADER_LIMIT).and_then(|v| v.parse().ok()),
            remaining: header_str(headers, HEADER_REMAINING).and_then(|v| v.parse().ok()),
            reset_after: header_str(headers, HEADER_RESET_AFTER).and_then(parse_seconds),
            bucket: header_str(headers, HEADER_BUCKET).map(str::to_string),
            global: header_str(headers, HEADER_GLOBAL)
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            retry_after: header_str(headers, HEADER_RETRY_AFTER).and_then(parse_seconds),
        }
    }

    /// Time to wait before retrying a throttled request.
    ///
    /// Prefers `retry-after`, then the window reset, then `fallback`.
    #[must_use]
    pub fn throttle_delay(&self, fallback: Duration) -> Duration {
        self.retry_after.or(self.reset_after).unwrap_or(fallback)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs.min(MAX_HEADER_DELAY.as_secs_f64())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_parse_full_set() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (HEADER_LIMIT, "5"),
            (HEADER_REMAINING, "4"),
            (HEADER_RESET_AFTER, "1.5"),
            (HEADER_BUCKET, "abcd1234"),
        ]));

        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.remaining, Some(4));
        assert_eq!(parsed.reset_after, Some(Duration::from_millis(1500)));
        assert_eq!(parsed.bucket.as_deref(), Some("abcd1234"));
        assert!(!parsed.global);
    }

    #[test]
    fn test_parse_global_throttle() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (HEADER_GLOBAL, "true"),
            (HEADER_RETRY_AFTER, "2"),
        ]));
        assert!(parsed.global);
        assert_eq!(parsed.throttle_delay(Duration::ZERO), Duration::from_secs(2));
    }

    #[test]
    fn test_malformed_values_ignored() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (HEADER_LIMIT, "many"),
            (HEADER_RESET_AFTER, "-1"),
        ]));
        assert_eq!(parsed, RateLimitHeaders::default());
    }

    #[test]
    fn test_huge_delays_clamped() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            (HEADER_RETRY_AFTER, "1e30"),
            (HEADER_RESET_AFTER, "inf"),
        ]));
        assert_eq!(parsed.retry_after, Some(MAX_HEADER_DELAY));
        assert_eq!(parsed.reset_after, Some(MAX_HEADER_DELAY));

        let parsed = RateLimitHeaders::parse(&headers(&[(HEADER_RETRY_AFTER, "NaN")]));
        assert_eq!(parsed.retry_after, None);
    }

    #[test]
    fn test_throttle_delay_fallback() {
        let parsed = RateLimitHeaders::default();
        assert_eq!(parsed.throttle_delay(Duration::from_secs(1)), Duration::from_secs(1));
    }
}
