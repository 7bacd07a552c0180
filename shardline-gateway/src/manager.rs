//! Shard manager.
//!
//! Starts one session per assigned shard, shares the cache, listener
//! registry and identify queue between them, and collects fatal session
//! errors.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use shardline_cache::EntityCache;
use shardline_events::{EventFilter, EventRegistry, Listener, ListenerId};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::{ConfigError, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::identify::IdentifyQueue;
use crate::protocol::GatewayCommand;
use crate::session::{SessionContext, ShardHandle, ShardInfo};
use crate::transport::GatewayTransport;

/// Returns the shard that receives events for `id`.
///
/// A `total` of zero means sharding is unset and everything maps to shard 0.
#[must_use]
pub const fn shard_for(id: u64, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    // The remainder is below `total`, so it fits.
    #[allow(clippy::cast_possible_truncation)]
    let shard = ((id >> 22) % total as u64) as u32;
    shard
}

/// Which shards this process runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ShardAssignment {
    /// Every shard.
    #[default]
    All,
    /// Shards `start..end`.
    Range {
        /// First shard.
        start: u32,
        /// One past the last shard.
        end: u32,
    },
    /// An explicit set of shards.
    List {
        /// Shard indices.
        shards: Vec<u32>,
    },
}

impl ShardAssignment {
    /// Resolves the assignment against `count` shards, returning sorted,
    /// deduplicated indices.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidAssignment`] if the assignment is empty
    /// or names a shard outside `0..count`.
    pub fn indices(&self, count: u32) -> GatewayResult<Vec<u32>> {
        let mut indices: Vec<u32> = match self {
            Self::All => (0..count).collect(),
            Self::Range { start, end } => {
                if start >= end {
                    return Err(GatewayError::InvalidAssignment {
                        reason: format!("empty range {start}..{end}"),
                    });
                }
                (*start..*end).collect()
            }
            Self::List { shards } => shards.clone(),
        };
        indices.sort_unstable();
        indices.dedup();

        if indices.is_empty() {
            return Err(GatewayError::InvalidAssignment {
                reason: "no shards assigned".to_string(),
            });
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= count) {
            return Err(GatewayError::InvalidAssignment {
                reason: format!("shard {bad} is not below the shard count {count}"),
            });
        }
        Ok(indices)
    }
}

/// Owns the shard sessions of one process.
pub struct ShardManager {
    context: SessionContext,
    shards: Mutex<BTreeMap<u32, ShardHandle>>,
    shard_count: Mutex<u32>,
    fatal: tokio::sync::Mutex<mpsc::UnboundedReceiver<GatewayError>>,
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("config", &self.context.config)
            .field("shard_count", &self.shard_count())
            .finish_non_exhaustive()
    }
}

impl ShardManager {
    /// Creates a manager. No shard runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: GatewayConfig,
        transport: Arc<dyn GatewayTransport>,
        cache: Arc<EntityCache>,
        events: EventRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let identify = Arc::new(IdentifyQueue::new(
            config.max_concurrency,
            config.identify_interval,
        ));
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        Ok(Self {
            context: SessionContext {
                config: Arc::new(config),
                transport,
                cache,
                events,
                identify,
                fatal: fatal_tx,
            },
            shards: Mutex::new(BTreeMap::new()),
            shard_count: Mutex::new(0),
            fatal: tokio::sync::Mutex::new(fatal_rx),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.context.config
    }

    /// Returns the shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.context.cache
    }

    /// Returns the shared listener registry.
    #[must_use]
    pub const fn events(&self) -> &EventRegistry {
        &self.context.events
    }

    /// Starts a session for each assigned shard of `shard_count`.
    ///
    /// A `shard_count` of zero runs a single shard, index 0 of 1.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AlreadyStarted`] if shards are running, or
    /// [`GatewayError::InvalidAssignment`] if the assignment does not fit.
    pub fn start(&self, shard_count: u32, assignment: &ShardAssignment) -> GatewayResult<()> {
        let count = shard_count.max(1);
        let indices = assignment.indices(count)?;

        let mut shards = self.shards.lock().unwrap_or_else(PoisonError::into_inner);
        if !shards.is_empty() {
            return Err(GatewayError::AlreadyStarted);
        }
        *self
            .shard_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = count;

        info!(count, shards = ?indices, "Starting shards");
        for index in indices {
            let handle = ShardHandle::spawn(index, count, self.context.clone());
            shards.insert(index, handle);
        }
        Ok(())
    }

    /// Stops every shard and waits for the sessions to end.
    pub async fn stop(&self) {
        let handles: Vec<ShardHandle> = {
            let mut shards = self.shards.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *shards).into_values().collect()
        };
        if handles.is_empty() {
            return;
        }
        info!(shards = handles.len(), "Stopping shards");

        let stops = handles.into_iter().map(|mut handle| async move {
            handle.stop().await;
        });
        futures::future::join_all(stops).await;
    }

    /// Shard count the manager was started with, 0 before start.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        *self
            .shard_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the shard that receives events for `id`.
    #[must_use]
    pub fn shard_for(&self, id: u64) -> u32 {
        shard_for(id, self.shard_count())
    }

    /// Snapshots of every running shard, by index.
    #[must_use]
    pub fn shards(&self) -> Vec<ShardInfo> {
        self.shards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(ShardHandle::info)
            .collect()
    }

    /// Snapshot of one shard.
    #[must_use]
    pub fn shard(&self, index: u32) -> Option<ShardInfo> {
        self.shards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .map(ShardHandle::info)
    }

    /// Receiver observing one shard's snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownShard`] if the shard is not running.
    pub fn watch(&self, index: u32) -> GatewayResult<watch::Receiver<ShardInfo>> {
        self.shards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .map(ShardHandle::watch)
            .ok_or(GatewayError::UnknownShard { shard: index })
    }

    /// Queues a command on one shard.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UnknownShard`] if the shard is not running, or
    /// [`GatewayError::Closed`] if its session has ended.
    pub fn send(&self, index: u32, command: GatewayCommand) -> GatewayResult<()> {
        let shards = self.shards.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = shards
            .get(&index)
            .ok_or(GatewayError::UnknownShard { shard: index })?;
        handle.send(command)
    }

    /// Registers a listener for every matching event of every shard.
    pub fn subscribe(&self, filter: EventFilter, listener: impl Listener) -> ListenerId {
        self.context.events.subscribe(filter, listener)
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.context.events.unsubscribe(id)
    }

    /// Waits for the next fatal session error.
    pub async fn next_fatal_error(&self) -> Option<GatewayError> {
        self.fatal.lock().await.recv().await
    }

    /// Drains fatal session errors reported so far.
    pub async fn take_fatal_errors(&self) -> Vec<GatewayError> {
        let mut rx = self.fatal.lock().await;
        let mut errors = Vec::new();
        while let Ok(error) = rx.try_recv() {
            errors.push(error);
        }
        if !errors.is_empty() {
            warn!(count = errors.len(), "Shards rejected by the gateway");
        }
        errors
    }
}
