//! Client configuration.
//!
//! Loaded from TOML. Every section and field is optional; missing values
//! take the defaults below.
//!
//! ```toml
//! token = "..."
//!
//! [gateway]
//! url = "wss://gateway.discord.gg"
//! intents = 33281
//! shards = 4
//! assignment = { kind = "range", start = 0, end = 2 }
//!
//! [http]
//! route_limit = 5
//! route_window_ms = 5000
//!
//! [cache]
//! kinds = ["guild", "channel", "member", "user"]
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shardline_cache::{CacheConfig, EntityKind};
use shardline_flow::transport::DEFAULT_API_BASE;
use shardline_flow::DispatcherConfig;
use shardline_gateway::config::DEFAULT_GATEWAY_URL;
use shardline_gateway::{intents, GatewayConfig, ShardAssignment};

use crate::error::{ClientError, ClientResult};

/// Gateway section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Gateway URL.
    pub url: String,
    /// Intent bitfield.
    pub intents: u64,
    /// Total shards; 0 runs a single shard.
    pub shards: u32,
    /// Shards run by this process.
    pub assignment: ShardAssignment,
    /// First reconnect delay.
    pub reconnect_delay_ms: u64,
    /// Reconnect delay ceiling.
    pub max_reconnect_delay_ms: u64,
    /// Rejected resumes tolerated before a fresh Identify.
    pub max_resume_attempts: u32,
    /// Hello wait after connecting.
    pub hello_timeout_ms: u64,
    /// Identify concurrency granted by the remote.
    pub max_concurrency: u32,
    /// Member count above which snapshots omit offline members.
    pub large_threshold: u32,
}

impl Default for GatewaySection {
    fn default() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            intents: intents::NON_PRIVILEGED,
            shards: 0,
            assignment: ShardAssignment::All,
            reconnect_delay_ms: millis(defaults.reconnect_delay),
            max_reconnect_delay_ms: millis(defaults.max_reconnect_delay),
            max_resume_attempts: defaults.max_resume_failures,
            hello_timeout_ms: millis(defaults.hello_timeout),
            max_concurrency: defaults.max_concurrency,
            large_threshold: defaults.large_threshold,
        }
    }
}

/// REST section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// API base URL.
    pub api_base: String,
    /// Requests per window assumed for a new route.
    pub route_limit: u32,
    /// Window assumed for a new route.
    pub route_window_ms: u64,
    /// Global requests per window.
    pub global_limit: u32,
    /// Global window.
    pub global_window_ms: u64,
    /// Attempts per request.
    pub max_attempts: u32,
    /// First transient-failure backoff.
    pub base_backoff_ms: u64,
    /// Backoff ceiling.
    pub max_backoff_ms: u64,
    /// Per-request deadline; 0 waits indefinitely.
    pub request_timeout_ms: u64,
    /// Idle time after which a route bucket is dropped.
    pub bucket_idle_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        let defaults = DispatcherConfig::default();
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            route_limit: defaults.route_limit,
            route_window_ms: millis(defaults.route_window),
            global_limit: defaults.global_limit,
            global_window_ms: millis(defaults.global_window),
            max_attempts: defaults.max_attempts,
            base_backoff_ms: millis(defaults.base_backoff),
            max_backoff_ms: millis(defaults.max_backoff),
            request_timeout_ms: defaults.request_timeout.map_or(0, millis),
            bucket_idle_ms: millis(defaults.bucket_idle_timeout),
        }
    }
}

/// Cache section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Entity kinds to store.
    pub kinds: Vec<EntityKind>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            kinds: EntityKind::ALL.to_vec(),
        }
    }
}

/// Complete client configuration.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bot token.
    pub token: String,
    /// Gateway settings.
    pub gateway: GatewaySection,
    /// REST settings.
    pub http: HttpSection,
    /// Cache settings.
    pub cache: CacheSection,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &"<redacted>")
            .field("gateway", &self.gateway)
            .field("http", &self.http)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a configuration with `token` and defaults elsewhere.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ClientError::ConfigIo {
                path: path.as_ref().display().to_string(),
                source: e,
            })?;
        Self::from_toml(&contents)
    }

    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed.
    pub fn from_toml(toml: &str) -> ClientResult<Self> {
        toml::from_str(toml).map_err(|e| ClientError::config(e.to_string()))
    }

    /// Serializes the configuration to TOML.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Gateway configuration derived from this file.
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new(self.token.clone())
            .with_gateway_url(self.gateway.url.clone())
            .with_intents(self.gateway.intents)
            .with_reconnect_delay(
                Duration::from_millis(self.gateway.reconnect_delay_ms),
                Duration::from_millis(self.gateway.max_reconnect_delay_ms),
            )
            .with_max_resume_failures(self.gateway.max_resume_attempts)
            .with_hello_timeout(Duration::from_millis(self.gateway.hello_timeout_ms));
        config.max_concurrency = self.gateway.max_concurrency;
        config.large_threshold = self.gateway.large_threshold;
        config
    }

    /// Dispatcher configuration derived from this file.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let http = &self.http;
        let timeout = (http.request_timeout_ms > 0)
            .then(|| Duration::from_millis(http.request_timeout_ms));
        DispatcherConfig {
            base_backoff: Duration::from_millis(http.base_backoff_ms),
            max_backoff: Duration::from_millis(http.max_backoff_ms),
            ..DispatcherConfig::default()
        }
        .with_route_limit(http.route_limit, Duration::from_millis(http.route_window_ms))
        .with_global_limit(http.global_limit, Duration::from_millis(http.global_window_ms))
        .with_max_attempts(http.max_attempts)
        .with_request_timeout(timeout)
        .with_bucket_idle_timeout(Duration::from_millis(http.bucket_idle_ms))
    }

    /// Cache configuration derived from this file.
    #[must_use]
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::with_kinds(self.cache.kinds.iter().copied())
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> ClientResult<()> {
        if self.http.api_base.is_empty() {
            return Err(ClientError::config("http: api_base must not be empty"));
        }
        self.gateway_config().validate()?;
        self.dispatcher_config().validate()?;
        self.gateway.assignment.indices(self.gateway.shards.max(1))?;
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
