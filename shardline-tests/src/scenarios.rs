//! Payload builders and ready-made fixtures.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use shardline::{Client, ClientConfig, ClientResult};
use shardline_cache::{CacheConfig, EntityCache};
use shardline_events::EventRegistry;
use shardline_gateway::{
    ConfigError, GatewayConfig, GatewayResult, ShardAssignment, ShardInfo, ShardManager, ShardState,
};
use tokio::sync::watch;

use crate::scripted_gateway::ScriptedGateway;
use crate::scripted_http::ScriptedHttp;

/// URL the scripted remote hands out for resuming.
pub const RESUME_URL: &str = "ws://resume.gateway.test";

/// Id of the connected account in every scenario.
pub const SELF_ID: u64 = 9;

/// Heartbeat interval used by scripted Hello frames.
pub const HEARTBEAT: Duration = Duration::from_secs(40);

/// READY payload for `[shard, count]` with the given guilds unavailable.
#[must_use]
pub fn ready(session_id: &str, shard: [u32; 2], guilds: &[u64]) -> Value {
    let guilds: Vec<Value> = guilds
        .iter()
        .map(|id| json!({ "id": id.to_string(), "unavailable": true }))
        .collect();
    json!({
        "v": 10,
        "session_id": session_id,
        "resume_gateway_url": RESUME_URL,
        "user": { "id": SELF_ID.to_string(), "username": "bot", "bot": true },
        "guilds": guilds,
        "shard": shard,
    })
}

/// GUILD_CREATE payload with one text channel and the given members.
#[must_use]
pub fn guild_create(guild_id: u64, members: &[u64]) -> Value {
    let members: Vec<Value> = members
        .iter()
        .map(|id| json!({ "user": { "id": id.to_string(), "username": format!("user{id}") } }))
        .collect();
    json!({
        "id": guild_id.to_string(),
        "name": format!("guild{guild_id}"),
        "owner_id": SELF_ID.to_string(),
        "channels": [{ "id": (guild_id * 10).to_string(), "type": 0, "name": "general" }],
        "roles": [],
        "members": members,
        "presences": [],
    })
}

/// GUILD_MEMBER_REMOVE payload.
#[must_use]
pub fn member_remove(guild_id: u64, user_id: u64) -> Value {
    json!({
        "guild_id": guild_id.to_string(),
        "user": { "id": user_id.to_string(), "username": format!("user{user_id}") },
    })
}

/// GUILD_MEMBER_ADD payload.
#[must_use]
pub fn member_add(guild_id: u64, user_id: u64) -> Value {
    json!({
        "guild_id": guild_id.to_string(),
        "user": { "id": user_id.to_string(), "username": format!("user{user_id}") },
        "roles": [],
    })
}

/// GUILD_DELETE payload. `unavailable` marks an outage rather than removal.
#[must_use]
pub fn guild_delete(guild_id: u64, unavailable: bool) -> Value {
    if unavailable {
        json!({ "id": guild_id.to_string(), "unavailable": true })
    } else {
        json!({ "id": guild_id.to_string() })
    }
}

/// PRESENCE_UPDATE payload.
#[must_use]
pub fn presence(guild_id: u64, user_id: u64, status: &str) -> Value {
    json!({
        "guild_id": guild_id.to_string(),
        "user": { "id": user_id.to_string() },
        "status": status,
        "activities": [],
    })
}

/// MESSAGE_CREATE payload.
#[must_use]
pub fn message(id: u64, guild_id: u64, author: u64, content: &str) -> Value {
    json!({
        "id": id.to_string(),
        "channel_id": (guild_id * 10).to_string(),
        "guild_id": guild_id.to_string(),
        "author": { "id": author.to_string(), "username": format!("user{author}") },
        "content": content,
    })
}

/// A user object as returned by the REST API.
#[must_use]
pub fn user(id: u64, name: &str) -> Value {
    json!({ "id": id.to_string(), "username": name })
}

/// Client configuration pointing at the scripted transports, with short
/// delays.
#[must_use]
pub fn client_config() -> ClientConfig {
    let gateway = GatewayConfig::for_testing();
    let mut config = ClientConfig::new(gateway.token);
    config.gateway.url = gateway.gateway_url;
    config.gateway.reconnect_delay_ms = 10;
    config.gateway.max_reconnect_delay_ms = 100;
    config.gateway.max_resume_attempts = gateway.max_resume_failures;
    config.gateway.hello_timeout_ms = 1_000;
    config.http.api_base = "http://api.test".to_string();
    config.http.route_window_ms = 1_000;
    config.http.base_backoff_ms = 10;
    config.http.max_backoff_ms = 100;
    config.http.max_attempts = 3;
    config.http.request_timeout_ms = 0;
    config
}

/// A client over scripted transports.
///
/// # Errors
///
/// Returns an error if `config` is invalid.
pub fn client(
    config: ClientConfig,
) -> ClientResult<(Client, Arc<ScriptedGateway>, Arc<ScriptedHttp>)> {
    let gateway = ScriptedGateway::new();
    let http = ScriptedHttp::new();
    let client = Client::with_transports(config, gateway.clone(), http.clone())?;
    Ok((client, gateway, http))
}

/// A shard manager over a scripted gateway.
pub struct Harness {
    /// The scripted remote.
    pub gateway: Arc<ScriptedGateway>,
    /// The manager under test.
    pub manager: ShardManager,
    /// Shared cache.
    pub cache: Arc<EntityCache>,
    /// Shared listeners.
    pub events: EventRegistry,
}

impl Harness {
    /// Creates a harness with `config` and a cache of every kind.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let gateway = ScriptedGateway::new();
        let cache = Arc::new(EntityCache::new(CacheConfig::default()));
        let events = EventRegistry::new();
        let manager =
            ShardManager::new(config, gateway.clone(), Arc::clone(&cache), events.clone())?;
        Ok(Self {
            gateway,
            manager,
            cache,
            events,
        })
    }

    /// Starts every shard of `count`.
    ///
    /// # Errors
    ///
    /// Returns an error if shards are already running.
    pub fn start(&self, count: u32) -> GatewayResult<()> {
        self.manager.start(count, &ShardAssignment::All)
    }

    /// Watches shard `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard is not running.
    pub fn watch(&self, index: u32) -> GatewayResult<watch::Receiver<ShardInfo>> {
        self.manager.watch(index)
    }
}

/// Waits until the watched shard reaches `state`.
///
/// # Errors
///
/// Returns an error if the shard's session ends first.
pub async fn wait_for_state(
    info: &mut watch::Receiver<ShardInfo>,
    state: ShardState,
) -> Result<ShardInfo, watch::error::RecvError> {
    info.wait_for(|i| i.state == state).await.map(|i| i.clone())
}
