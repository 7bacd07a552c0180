//! The client facade.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde_json::Value;
use shardline_cache::{CacheKey, CachedEntry, Channel, Entity, EntityCache, Member, Update, User};
use shardline_core::{ChannelId, GuildId, UserId};
use shardline_events::{
    decode_channel, decode_member, decode_user, Envelope, EventFilter, EventKind, EventRegistry,
    Listener, ListenerId,
};
use shardline_flow::{Dispatcher, HttpTransport, ReqwestTransport, Response, Route};
use shardline_gateway::{GatewayTransport, ShardManager, WebSocketTransport};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Timeout for a single HTTP exchange when no request deadline is set.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// A connected client: shards, cache, listeners and REST dispatcher.
///
/// The cache and listener registry are shared by every shard. REST fetches
/// write what they learn into the same cache, and successful mutations
/// update it before returning, without waiting for the gateway event.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    cache: Arc<EntityCache>,
    events: EventRegistry,
    dispatcher: Dispatcher,
    shards: ShardManager,
}

impl Client {
    /// Creates a client using the WebSocket gateway and the reqwest HTTP
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let timeout = match config.http.request_timeout_ms {
            0 => HTTP_TIMEOUT,
            ms => Duration::from_millis(ms),
        };
        let http = ReqwestTransport::new(config.http.api_base.clone(), Some(&config.token), timeout)?;
        Self::with_transports(config, Arc::new(WebSocketTransport::new()), Arc::new(http))
    }

    /// Creates a client over the given transports.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_transports(
        config: ClientConfig,
        gateway: Arc<dyn GatewayTransport>,
        http: Arc<dyn HttpTransport>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let cache = Arc::new(EntityCache::new(config.cache_config()));
        let events = EventRegistry::new();
        let dispatcher = Dispatcher::new(config.dispatcher_config(), http)?;
        let shards = ShardManager::new(
            config.gateway_config(),
            gateway,
            Arc::clone(&cache),
            events.clone(),
        )?;
        Ok(Self {
            config,
            cache,
            events,
            dispatcher,
            shards,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the entity cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Returns the listener registry.
    #[must_use]
    pub const fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Returns the REST dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the shard manager.
    #[must_use]
    pub const fn shards(&self) -> &ShardManager {
        &self.shards
    }

    /// Starts the configured shards.
    ///
    /// # Errors
    ///
    /// Returns an error if shards are already running or the assignment does
    /// not fit the shard count.
    pub fn start(&self) -> ClientResult<()> {
        info!(
            shards = self.config.gateway.shards,
            assignment = ?self.config.gateway.assignment,
            "Starting client"
        );
        self.shards
            .start(self.config.gateway.shards, &self.config.gateway.assignment)?;
        Ok(())
    }

    /// Stops every shard, then the dispatcher.
    pub async fn stop(&self) {
        self.shards.stop().await;
        self.dispatcher.shutdown().await;
        info!("Client stopped");
    }

    /// Registers a listener.
    pub fn subscribe(&self, filter: EventFilter, listener: impl Listener) -> ListenerId {
        self.events.subscribe(filter, listener)
    }

    /// Removes a listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Waits for the next event of `kind` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing matched within `deadline`.
    pub async fn wait_for(
        &self,
        kind: EventKind,
        predicate: impl Fn(&Envelope) -> bool + Send + Sync + 'static,
        deadline: Duration,
    ) -> ClientResult<Envelope> {
        Ok(self.events.wait_for(kind, predicate, deadline).await?)
    }

    /// Returns the cached entry under `key`.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedEntry>> {
        self.cache.get(key)
    }

    /// Sends a REST request, with an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher gives up on the request.
    pub async fn request(&self, route: &Route, body: Option<&Value>) -> ClientResult<Response> {
        let request = match body {
            Some(body) => route.request_json(body)?,
            None => route.request(),
        };
        Ok(self.dispatcher.execute(route.group(), request).await?)
    }

    /// Returns a user, from the cache or else from the API.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn fetch_user(&self, id: UserId) -> ClientResult<User> {
        if let Some(user) = self.cached(&CacheKey::user(id), Entity::as_user) {
            return Ok(user);
        }
        let body = self.send_json(&Route::get(format!("/users/{id}")), None).await?;
        let user = decode_user(&body)?;
        self.store(Entity::User(user.clone()));
        Ok(user)
    }

    /// Returns a guild member, from the cache or else from the API.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn fetch_member(&self, guild_id: GuildId, user_id: UserId) -> ClientResult<Member> {
        if let Some(member) = self.cached(&CacheKey::member(guild_id, user_id), Entity::as_member) {
            return Ok(member);
        }
        let route = Route::get(format!("/guilds/{guild_id}/members/{user_id}"));
        let body = self.send_json(&route, None).await?;
        let (member, user) = decode_member(guild_id, &body)?;
        self.store(Entity::User(user));
        self.store(Entity::Member(member.clone()));
        Ok(member)
    }

    /// Returns a channel, from the cache or else from the API.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn fetch_channel(
        &self,
        guild_id: Option<GuildId>,
        id: ChannelId,
    ) -> ClientResult<Channel> {
        if let Some(channel) = self.cached(&CacheKey::channel(guild_id, id), Entity::as_channel) {
            return Ok(channel);
        }
        let body = self.send_json(&Route::get(format!("/channels/{id}")), None).await?;
        let channel = decode_channel(&body)?;
        self.store(Entity::Channel(channel.clone()));
        Ok(channel)
    }

    /// Edits a channel and caches the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn modify_channel(&self, id: ChannelId, changes: &Value) -> ClientResult<Channel> {
        let route = Route::patch(format!("/channels/{id}"));
        let body = self.send_json(&route, Some(changes)).await?;
        let channel = decode_channel(&body)?;
        self.store(Entity::Channel(channel.clone()));
        Ok(channel)
    }

    /// Deletes a channel and drops it from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_channel(&self, guild_id: Option<GuildId>, id: ChannelId) -> ClientResult<()> {
        self.request(&Route::delete(format!("/channels/{id}")), None).await?;
        self.cache.remove(&CacheKey::channel(guild_id, id));
        Ok(())
    }

    /// Edits a guild member and caches the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn modify_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        changes: &Value,
    ) -> ClientResult<Member> {
        let route = Route::patch(format!("/guilds/{guild_id}/members/{user_id}"));
        let body = self.send_json(&route, Some(changes)).await?;
        let (member, user) = decode_member(guild_id, &body)?;
        self.store(Entity::User(user));
        self.store(Entity::Member(member.clone()));
        Ok(member)
    }

    /// Removes a member from a guild and drops it from the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn remove_member(&self, guild_id: GuildId, user_id: UserId) -> ClientResult<()> {
        let route = Route::delete(format!("/guilds/{guild_id}/members/{user_id}"));
        self.request(&route, None).await?;
        self.cache.remove(&CacheKey::member(guild_id, user_id));
        Ok(())
    }

    /// Edits the current user and caches the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn modify_current_user(&self, changes: &Value) -> ClientResult<User> {
        let body = self
            .send_json(&Route::patch("/users/@me"), Some(changes))
            .await?;
        let user = decode_user(&body)?;
        self.cache.set_self_user(user.clone());
        Ok(user)
    }

    fn cached<T: Clone>(&self, key: &CacheKey, view: fn(&Entity) -> Option<&T>) -> Option<T> {
        self.cache
            .get(key)
            .and_then(|entry| view(&entry.entity).cloned())
    }

    fn store(&self, entity: Entity) {
        let key = CacheKey::of(&entity);
        if let Err(e) = self.cache.upsert(key, Update::Full(entity)) {
            debug!(key = %key, error = %e, "Entity from response not cached");
        }
    }

    async fn send_json(&self, route: &Route, body: Option<&Value>) -> ClientResult<Value> {
        let response = self.request(route, body).await?;
        if response.status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        Ok(response.json()?)
    }
}
