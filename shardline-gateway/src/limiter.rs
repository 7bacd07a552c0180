//! Per-shard outbound command limiter.
//!
//! The remote closes a connection that sends more than `command_limit`
//! frames in a window. Commands share `command_limit - heartbeat_reserve`
//! slots; heartbeats never wait, so the reserved slots keep them within the
//! limit even when commands saturate their share.

use std::time::Duration;

use shardline_flow::WindowLimiter;

use crate::config::GatewayConfig;

/// Rate limiter for a shard's outbound commands.
#[derive(Debug, Clone)]
pub struct CommandLimiter {
    window: WindowLimiter,
    budget: u32,
}

impl CommandLimiter {
    /// Creates a limiter for `limit` frames per `window`, keeping `reserve`
    /// of them for heartbeats.
    #[must_use]
    pub fn new(limit: u32, window: Duration, reserve: u32) -> Self {
        let budget = limit.saturating_sub(reserve).max(1);
        Self {
            window: WindowLimiter::new(budget, window),
            budget,
        }
    }

    /// Creates a limiter from the gateway configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.command_limit,
            config.command_window,
            config.heartbeat_reserve,
        )
    }

    /// Commands allowed per window.
    #[must_use]
    pub const fn budget(&self) -> u32 {
        self.budget
    }

    /// Waits for a command slot.
    pub async fn acquire(&self) {
        self.window.acquire().await;
    }

    /// Takes a command slot if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        self.window.try_acquire().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_budget_excludes_reserve() {
        let limiter = CommandLimiter::from_config(&GatewayConfig::default());
        assert_eq!(limiter.budget(), 117);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_wait_for_next_window() {
        let limiter = CommandLimiter::new(3, Duration::from_secs(60), 1);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(!limiter.try_acquire().await);

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
