//! Dispatcher configuration.

use std::time::Duration;

/// Configuration for the request dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Requests per window assumed for a route before the remote reports its
    /// real limit.
    pub route_limit: u32,
    /// Window length assumed for a route.
    pub route_window: Duration,
    /// Global requests per window.
    pub global_limit: u32,
    /// Global window length.
    pub global_window: Duration,
    /// Attempts per request before giving up (throttles and transient
    /// failures both count).
    pub max_attempts: u32,
    /// First retry delay for transient failures.
    pub base_backoff: Duration,
    /// Upper bound for the retry delay.
    pub max_backoff: Duration,
    /// Delay used when a throttle response carries no retry-after.
    pub default_retry_after: Duration,
    /// Deadline applied by `execute` when the caller supplies none.
    pub request_timeout: Option<Duration>,
    /// How long a route bucket may sit with an empty queue and a reset
    /// window before its worker is dropped.
    pub bucket_idle_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            route_limit: 5,
            route_window: Duration::from_secs(5),
            global_limit: 50,
            global_window: Duration::from_secs(1),
            max_attempts: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            default_retry_after: Duration::from_secs(1),
            request_timeout: Some(Duration::from_secs(30)),
            bucket_idle_timeout: Duration::from_secs(300),
        }
    }
}

impl DispatcherConfig {
    /// Creates a configuration suitable for testing (small windows, fast
    /// backoff).
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            route_limit: 5,
            route_window: Duration::from_secs(1),
            global_limit: 1_000,
            global_window: Duration::from_secs(1),
            max_attempts: 3,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            default_retry_after: Duration::from_millis(100),
            request_timeout: None,
            bucket_idle_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the route defaults.
    #[must_use]
    pub const fn with_route_limit(mut self, limit: u32, window: Duration) -> Self {
        self.route_limit = limit;
        self.route_window = window;
        self
    }

    /// Sets the global limit.
    #[must_use]
    pub const fn with_global_limit(mut self, limit: u32, window: Duration) -> Self {
        self.global_limit = limit;
        self.global_window = window;
        self
    }

    /// Sets the attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the default deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how long an idle route bucket is kept.
    #[must_use]
    pub const fn with_bucket_idle_timeout(mut self, idle: Duration) -> Self {
        self.bucket_idle_timeout = idle;
        self
    }

    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any limit is zero or the backoff range is inverted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.route_limit == 0 || self.global_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "limit",
                reason: "must be positive",
            });
        }
        if self.route_window.is_zero() || self.global_window.is_zero() {
            return Err(ConfigError::Invalid {
                field: "window",
                reason: "must be non-zero",
            });
        }
        if self.bucket_idle_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "bucket_idle_timeout",
                reason: "must be non-zero",
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.max_backoff < self.base_backoff {
            return Err(ConfigError::Invalid {
                field: "max_backoff",
                reason: "must be >= base_backoff",
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
