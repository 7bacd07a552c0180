//! Fixed-window rate-limit bucket.
//!
//! A window bucket allows `limit` acquisitions per window. The window opens on
//! the first acquisition and closes at `reset_at`; once the clock passes
//! `reset_at` the bucket refills to `limit`. The remote service may overwrite
//! both `remaining` and `reset_at` at any time through response headers or a
//! throttle response, which always wins over the local estimate.
//!
//! All methods take the current time as a parameter so the bucket stays a
//! plain value that tests can drive deterministically.

use std::time::Duration;

use tokio::time::Instant;

use crate::headers::{RateLimitHeaders, MAX_HEADER_DELAY};

/// A fixed-window request budget.
#[derive(Debug, Clone)]
pub struct WindowBucket {
    /// Requests allowed per window.
    limit: u32,

    /// Requests left in the current window.
    remaining: u32,

    /// Length of a locally estimated window.
    window: Duration,

    /// When the current window closes. `None` until the first acquisition.
    reset_at: Option<Instant>,
}

impl WindowBucket {
    /// Creates a full bucket.
    #[must_use]
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            remaining: limit,
            window,
            reset_at: None,
        }
    }

    /// Returns the per-window limit.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the requests left in the current window.
    ///
    /// This does NOT refresh the window. Use `refresh()` first for an
    /// accurate count.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Returns when the current window closes, if one is open.
    #[must_use]
    pub const fn reset_at(&self) -> Option<Instant> {
        self.reset_at
    }

    /// Refills the bucket if the current window has closed.
    ///
    /// Returns true if a refill happened.
    pub fn refresh(&mut self, now: Instant) -> bool {
        match self.reset_at {
            Some(reset) if now >= reset => {
                self.remaining = self.limit;
                self.reset_at = None;
                true
            }
            _ => false,
        }
    }

    /// Attempts to take one slot.
    ///
    /// # Errors
    ///
    /// Returns the instant at which a slot may next be available.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Instant> {
        self.refresh(now);

        if self.remaining > 0 {
            self.remaining -= 1;
            if self.reset_at.is_none() {
                self.reset_at = Some(now + self.window);
            }
            return Ok(());
        }

        // A zero limit with no open window would otherwise never wake up.
        Err(*self.reset_at.get_or_insert(now + self.window))
    }

    /// Applies limits reported by the remote side.
    ///
    /// Headers override the local estimate: they may shrink the budget or
    /// free capacity early.
    pub fn apply_headers(&mut self, headers: &RateLimitHeaders, now: Instant) {
        if let Some(limit) = headers.limit {
            self.limit = limit;
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = remaining.min(self.limit);
        }
        if let Some(reset_after) = headers.reset_after {
            self.reset_at = Some(later(now, reset_after));
        }
    }

    /// Closes the bucket until `now + retry_after`.
    ///
    /// Used when the remote side throttles a request; it overrides any
    /// locally estimated window.
    pub fn throttle(&mut self, retry_after: Duration, now: Instant) {
        self.remaining = 0;
        self.reset_at = Some(later(now, retry_after));
    }
}

/// `now + delay`, capped where the clock cannot represent it.
fn later(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(MAX_HEADER_DELAY))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bucket_is_full() {
        let bucket = WindowBucket::new(5, Duration::from_secs(1));
        assert_eq!(bucket.remaining(), 5);
        assert_eq!(bucket.limit(), 5);
        assert!(bucket.reset_at().is_none());
    }

    #[test]
    fn test_acquire_opens_window() {
        let now = Instant::now();
        let mut bucket = WindowBucket::new(2, Duration::from_secs(1));

        bucket.try_acquire(now).unwrap();
        assert_eq!(bucket.remaining(), 1);
        assert_eq!(bucket.reset_at(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_exhausted_bucket_reports_reset() {
        let now = Instant::now();
        let mut bucket = WindowBucket::new(1, Duration::from_secs(2));

        bucket.try_acquire(now).unwrap();
        let until = bucket.try_acquire(now).unwrap_err();
        assert_eq!(until, now + Duration::from_secs(2));
    }

    #[test]
    fn test_refill_after_window() {
        let now = Instant::now();
        let mut bucket = WindowBucket::new(1, Duration::from_secs(1));

        bucket.try_acquire(now).unwrap();
        assert!(bucket.try_acquire(now + Duration::from_millis(999)).is_err());
        assert!(bucket.try_acquire(now + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_headers_override_estimate() {
        let now = Instant::now();
        let mut bucket = WindowBucket::new(5, Duration::from_secs(1));
        bucket.try_acquire(now).unwrap();

        let headers = RateLimitHeaders {
            limit: Some(10),
            remaining: Some(0),
            reset_after: Some(Duration::from_secs(7)),
            ..RateLimitHeaders::default()
        };
        bucket.apply_headers(&headers, now);

        assert_eq!(bucket.limit(), 10);
        assert_eq!(bucket.try_acquire(now).unwrap_err(), now + Duration::from_secs(7));
    }

    #[test]
    fn test_throttle_overrides_shorter_window() {
        let now = Instant::now();
        let mut bucket = WindowBucket::new(5, Duration::from_secs(1));
        bucket.try_acquire(now).unwrap();

        bucket.throttle(Duration::from_secs(3), now);

        // Local window would have closed at 1s, the throttle holds until 3s.
        assert!(bucket.try_acquire(now + Duration::from_secs(2)).is_err());
        assert!(bucket.try_acquire(now + Duration::from_secs(3)).is_ok());
    }

    #[test]
    fn test_throttle_beyond_clock_does_not_panic() {
        let now = Instant::now();
        let mut bucket = WindowBucket::new(5, Duration::from_secs(1));

        bucket.throttle(Duration::MAX, now);
        let until = bucket.try_acquire(now).unwrap_err();
        assert!(until > now);
    }

    #[test]
    fn test_zero_limit_still_wakes() {
        let now = Instant::now();
        let mut bucket = WindowBucket::new(0, Duration::from_secs(1));
        assert_eq!(bucket.try_acquire(now).unwrap_err(), now + Duration::from_secs(1));
    }
}
