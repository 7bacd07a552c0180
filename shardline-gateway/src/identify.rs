//! Identify concurrency gate.
//!
//! The remote accepts one Identify per bucket every few seconds, where a
//! shard's bucket is `index % max_concurrency`. Shards in different buckets
//! identify in parallel; shards in the same bucket queue behind each other.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Spaces identifies per concurrency bucket.
#[derive(Debug)]
pub struct IdentifyQueue {
    buckets: Vec<Mutex<Option<Instant>>>,
    interval: Duration,
}

impl IdentifyQueue {
    /// Creates a queue with `max_concurrency` buckets (at least one).
    #[must_use]
    pub fn new(max_concurrency: u32, interval: Duration) -> Self {
        let count = max_concurrency.max(1);
        Self {
            buckets: (0..count).map(|_| Mutex::new(None)).collect(),
            interval,
        }
    }

    /// Number of buckets.
    #[must_use]
    pub fn concurrency(&self) -> u32 {
        u32::try_from(self.buckets.len()).unwrap_or(u32::MAX)
    }

    /// Waits until `shard` may identify and claims the slot.
    ///
    /// Waiters in one bucket are served in lock order.
    pub async fn wait(&self, shard: u32) {
        let index = shard as usize % self.buckets.len();
        let mut last = self.buckets[index].lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                debug!(shard, bucket = index, "Waiting for identify slot");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_same_bucket_is_spaced() {
        let queue = IdentifyQueue::new(1, Duration::from_secs(5));
        let start = Instant::now();

        queue.wait(0).await;
        queue.wait(1).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_buckets_run_together() {
        let queue = IdentifyQueue::new(2, Duration::from_secs(5));
        let start = Instant::now();

        queue.wait(0).await;
        queue.wait(1).await;
        assert!(start.elapsed() < Duration::from_secs(1));

        queue.wait(2).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
