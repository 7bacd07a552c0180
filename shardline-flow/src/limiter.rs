//! Shared asynchronous window limiter.
//!
//! Wraps a [`WindowBucket`] so several tasks can wait on the same budget.
//! The dispatcher uses one for the global limit; each gateway shard uses one
//! for its outbound command budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::headers::RateLimitHeaders;
use crate::window::WindowBucket;

/// A window bucket shared between tasks.
#[derive(Debug, Clone)]
pub struct WindowLimiter {
    bucket: Arc<Mutex<WindowBucket>>,
}

impl WindowLimiter {
    /// Creates a limiter allowing `limit` acquisitions per `window`.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(WindowBucket::new(limit, window))),
        }
    }

    /// Waits until a slot is available and takes it.
    ///
    /// The lock is not held while sleeping, so a throttle reported by
    /// another task takes effect for every waiter.
    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_acquire(Instant::now()) {
                    Ok(()) => return,
                    Err(until) => until,
                }
            };
            sleep_until(wait_until).await;
        }
    }

    /// Takes a slot if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        self.bucket.lock().await.try_acquire(Instant::now()).is_ok()
    }

    /// Closes the window until `now + retry_after`.
    pub async fn throttle(&self, retry_after: Duration) {
        self.bucket.lock().await.throttle(retry_after, Instant::now());
    }

    /// Applies limits reported by the remote side.
    pub async fn apply_headers(&self, headers: &RateLimitHeaders) {
        self.bucket.lock().await.apply_headers(headers, Instant::now());
    }

    /// Returns the slots left in the current window.
    pub async fn remaining(&self) -> u32 {
        let mut bucket = self.bucket.lock().await;
        bucket.refresh(Instant::now());
        bucket.remaining()
    }

    /// Returns true while a window is open and has not yet reset.
    pub async fn is_open(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.refresh(Instant::now());
        bucket.reset_at().is_some()
    }

    /// Returns true if `other` draws from the same window.
    #[must_use]
    pub fn same_window(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bucket, &other.bucket)
    }

    /// Number of limiter handles sharing this window.
    pub(crate) fn holders(&self) -> usize {
        Arc::strong_count(&self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_window() {
        let limiter = WindowLimiter::new(2, Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(Instant::now(), start);

        limiter.acquire().await;
        assert!(Instant::now() >= start + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_blocks_waiters() {
        let limiter = WindowLimiter::new(10, Duration::from_secs(1));
        let start = Instant::now();

        limiter.throttle(Duration::from_secs(5)).await;
        assert!(!limiter.try_acquire().await);

        limiter.acquire().await;
        assert!(Instant::now() >= start + Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_closes_after_reset() {
        let limiter = WindowLimiter::new(3, Duration::from_secs(1));
        assert!(!limiter.is_open().await);

        limiter.acquire().await;
        assert!(limiter.is_open().await);
        assert!(limiter.same_window(&limiter.clone()));
        assert_eq!(limiter.holders(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!limiter.is_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_refreshes() {
        let limiter = WindowLimiter::new(1, Duration::from_secs(1));
        limiter.acquire().await;
        assert_eq!(limiter.remaining().await, 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.remaining().await, 1);
    }
}
