//! Gateway configuration.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::protocol::{intents, ConnectionProperties};

/// Default gateway URL.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Configuration shared by every shard session.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Bot token sent in Identify and Resume.
    pub token: String,
    /// Gateway URL used for fresh connections.
    pub gateway_url: String,
    /// Intent bitfield.
    pub intents: u64,
    /// Member count above which guild snapshots omit offline members.
    pub large_threshold: u32,
    /// Client properties sent in Identify.
    pub properties: ConnectionProperties,
    /// Initial presence sent in Identify.
    pub presence: Option<Value>,
    /// Delay before the first reconnect attempt.
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Rejected resumes tolerated before falling back to a fresh Identify.
    pub max_resume_failures: u32,
    /// How long to wait for Hello after connecting.
    pub hello_timeout: Duration,
    /// Commands allowed per window, heartbeats included.
    pub command_limit: u32,
    /// Command window length.
    pub command_window: Duration,
    /// Slots of each command window kept free for heartbeats.
    pub heartbeat_reserve: u32,
    /// Identify buckets the remote allows to proceed concurrently.
    pub max_concurrency: u32,
    /// Minimum spacing between identifies in one bucket.
    pub identify_interval: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("gateway_url", &self.gateway_url)
            .field("intents", &self.intents)
            .field("large_threshold", &self.large_threshold)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("max_resume_failures", &self.max_resume_failures)
            .field("hello_timeout", &self.hello_timeout)
            .field("command_limit", &self.command_limit)
            .field("command_window", &self.command_window)
            .field("heartbeat_reserve", &self.heartbeat_reserve)
            .field("max_concurrency", &self.max_concurrency)
            .field("identify_interval", &self.identify_interval)
            .finish_non_exhaustive()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            intents: intents::NON_PRIVILEGED,
            large_threshold: 50,
            properties: ConnectionProperties::default(),
            presence: None,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
            max_resume_failures: 3,
            hello_timeout: Duration::from_secs(20),
            command_limit: 120,
            command_window: Duration::from_secs(60),
            heartbeat_reserve: 3,
            max_concurrency: 1,
            identify_interval: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    /// Creates a configuration with the given token and defaults elsewhere.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration suitable for testing (short delays, no
    /// identify spacing).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            token: "test-token".to_string(),
            gateway_url: "ws://gateway.test".to_string(),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(100),
            max_resume_failures: 2,
            hello_timeout: Duration::from_secs(1),
            identify_interval: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Sets the gateway URL.
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    /// Sets the intents.
    #[must_use]
    pub const fn with_intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }

    /// Sets the initial presence.
    #[must_use]
    pub fn with_presence(mut self, presence: Value) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Sets the reconnect delay range.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max;
        self
    }

    /// Sets the resume failure ceiling.
    #[must_use]
    pub const fn with_max_resume_failures(mut self, failures: u32) -> Self {
        self.max_resume_failures = failures;
        self
    }

    /// Sets the Hello timeout.
    #[must_use]
    pub const fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    /// Sets the identify concurrency and spacing.
    #[must_use]
    pub const fn with_identify_limit(mut self, max_concurrency: u32, interval: Duration) -> Self {
        self.max_concurrency = max_concurrency;
        self.identify_interval = interval;
        self
    }

    /// Sets the command window.
    #[must_use]
    pub const fn with_command_limit(mut self, limit: u32, window: Duration, reserve: u32) -> Self {
        self.command_limit = limit;
        self.command_window = window;
        self.heartbeat_reserve = reserve;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based), doubling from
    /// `reconnect_delay` up to `max_reconnect_delay`.
    #[must_use]
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(1 << exponent)
            .min(self.max_reconnect_delay)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty, the command window leaves no
    /// room for commands, or a limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::Invalid {
                field: "token",
                reason: "must not be empty",
            });
        }
        if self.gateway_url.is_empty() {
            return Err(ConfigError::Invalid {
                field: "gateway_url",
                reason: "must not be empty",
            });
        }
        if self.command_limit <= self.heartbeat_reserve {
            return Err(ConfigError::Invalid {
                field: "command_limit",
                reason: "must exceed heartbeat_reserve",
            });
        }
        if self.command_window.is_zero() {
            return Err(ConfigError::Invalid {
                field: "command_window",
                reason: "must be non-zero",
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrency",
                reason: "must be at least 1",
            });
        }
        if self.hello_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "hello_timeout",
                reason: "must be non-zero",
            });
        }
        if self.max_reconnect_delay < self.reconnect_delay {
            return Err(ConfigError::Invalid {
                field: "max_reconnect_delay",
                reason: "must be >= reconnect_delay",
            });
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A field holds an invalid value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it is invalid.
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_needs_token() {
        assert!(GatewayConfig::default().validate().is_err());
        assert!(GatewayConfig::new("abc").validate().is_ok());
        assert!(GatewayConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_reserve_must_leave_room() {
        let config = GatewayConfig::for_testing().with_command_limit(3, Duration::from_secs(60), 3);
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "command_limit",
                reason: "must exceed heartbeat_reserve",
            })
        );
    }

    #[test]
    fn test_reconnect_backoff() {
        let config = GatewayConfig::default();
        assert_eq!(config.reconnect_backoff(1), Duration::from_secs(1));
        assert_eq!(config.reconnect_backoff(3), Duration::from_secs(4));
        assert_eq!(config.reconnect_backoff(20), Duration::from_secs(60));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", GatewayConfig::new("secret-token"));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
