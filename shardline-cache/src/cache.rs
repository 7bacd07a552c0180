//! The entity cache.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shardline_core::{GuildId, Snowflake, UserId};
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::entity::{Entity, EntityKind, Guild, User};
use crate::error::{CacheError, CacheResult};
use crate::key::{CacheKey, CachedEntry, Update};
use crate::patch::{CacheOp, CachePatch};
use crate::values::Values;

type ChildKey = (EntityKind, Snowflake);

/// Everything stored under one guild.
#[derive(Debug, Default)]
struct Partition {
    guild: Option<Arc<CachedEntry>>,
    children: HashMap<ChildKey, Arc<CachedEntry>>,
    /// Set when the contents may have missed events; cleared by a snapshot.
    stale: bool,
}

/// Entry counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Guild entries.
    pub guilds: usize,
    /// Channel entries.
    pub channels: usize,
    /// Role entries.
    pub roles: usize,
    /// Member entries.
    pub members: usize,
    /// User entries.
    pub users: usize,
    /// Presence entries.
    pub presences: usize,
    /// Guild partitions currently marked stale.
    pub stale_guilds: usize,
}

impl CacheStats {
    fn count(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Guild => self.guilds += 1,
            EntityKind::Channel => self.channels += 1,
            EntityKind::Role => self.roles += 1,
            EntityKind::Member => self.members += 1,
            EntityKind::User => self.users += 1,
            EntityKind::Presence => self.presences += 1,
        }
    }
}

/// Concurrent store of versioned entity snapshots.
///
/// Writes to one guild partition (or one root key) are serialized by the
/// map's shard lock, so concurrent upserts of the same key behave as if they
/// ran one after another.
#[derive(Debug, Default)]
pub struct EntityCache {
    config: CacheConfig,
    roots: DashMap<ChildKey, Arc<CachedEntry>>,
    partitions: DashMap<GuildId, Partition>,
    self_user: RwLock<Option<User>>,
}

/// Builds the entry that follows `previous` after `update`.
fn next_entry(
    key: CacheKey,
    previous: Option<&CachedEntry>,
    update: Update,
) -> CacheResult<CachedEntry> {
    let version = previous.map_or(1, |p| p.version + 1);
    let entity = match update {
        Update::Full(entity) => entity,
        Update::Partial(patch) => {
            let Some(previous) = previous else {
                return Err(CacheError::StalePatch { key });
            };
            let actual = patch.kind();
            let mut entity = previous.entity.clone();
            if !patch.merge_into(&mut entity) {
                return Err(CacheError::KindMismatch { key, actual });
            }
            entity
        }
    };
    Ok(CachedEntry {
        key,
        version,
        entity,
    })
}

impl EntityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the entry stored under `key`.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedEntry>> {
        match key.partition() {
            Some(guild) => {
                let partition = self.partitions.get(&guild)?;
                if key.kind == EntityKind::Guild {
                    partition.guild.clone()
                } else {
                    partition.children.get(&(key.kind, key.id)).cloned()
                }
            }
            None => self.roots.get(&(key.kind, key.id)).map(|e| Arc::clone(e.value())),
        }
    }

    /// Writes `update` to `key` and returns the entry's new version.
    ///
    /// # Errors
    ///
    /// - [`CacheError::KindMismatch`] if the update's kind differs from the
    ///   key's.
    /// - [`CacheError::KindDisabled`] if the kind is not cached.
    /// - [`CacheError::StalePatch`] if a partial update has nothing to merge
    ///   onto. No entry is created.
    pub fn upsert(&self, key: CacheKey, update: Update) -> CacheResult<u64> {
        let actual = update.kind();
        if actual != key.kind {
            return Err(CacheError::KindMismatch { key, actual });
        }
        if !self.config.stores(key.kind) {
            return Err(CacheError::KindDisabled { kind: key.kind });
        }

        let entry = match key.partition() {
            Some(guild) => {
                let mut partition = match &update {
                    Update::Full(_) => self.partitions.entry(guild).or_default(),
                    Update::Partial(_) => self
                        .partitions
                        .get_mut(&guild)
                        .ok_or(CacheError::StalePatch { key })?,
                };
                if key.kind == EntityKind::Guild {
                    let next = Arc::new(next_entry(key, partition.guild.as_deref(), update)?);
                    partition.guild = Some(Arc::clone(&next));
                    next
                } else {
                    let child = (key.kind, key.id);
                    let previous = partition.children.get(&child).map(AsRef::as_ref);
                    let next = Arc::new(next_entry(key, previous, update)?);
                    partition.children.insert(child, Arc::clone(&next));
                    next
                }
            }
            None => match self.roots.entry((key.kind, key.id)) {
                Entry::Occupied(mut occupied) => {
                    let next = Arc::new(next_entry(key, Some(occupied.get().as_ref()), update)?);
                    occupied.insert(Arc::clone(&next));
                    next
                }
                Entry::Vacant(vacant) => {
                    let next = Arc::new(next_entry(key, None, update)?);
                    vacant.insert(Arc::clone(&next));
                    next
                }
            },
        };

        trace!(key = %key, version = entry.version, "Cache upsert");
        Ok(entry.version)
    }

    /// Removes the entry under `key`.
    ///
    /// Removing a guild removes its partition, and with it every channel,
    /// role, member and presence of the guild, in one step.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<CachedEntry>> {
        match key.partition() {
            Some(guild) if key.kind == EntityKind::Guild => {
                let (_, partition) = self.partitions.remove(&guild)?;
                debug!(
                    guild_id = guild.get(),
                    children = partition.children.len(),
                    "Removed guild partition"
                );
                partition.guild
            }
            Some(guild) => self
                .partitions
                .get_mut(&guild)?
                .children
                .remove(&(key.kind, key.id)),
            None => self.roots.remove(&(key.kind, key.id)).map(|(_, e)| e),
        }
    }

    /// Removes every entry keyed under `parent`, keeping the guild itself.
    ///
    /// Returns the number of entries removed.
    pub fn remove_all_under(&self, parent: GuildId) -> usize {
        self.partitions.get_mut(&parent).map_or(0, |mut partition| {
            let removed = partition.children.len();
            partition.children.clear();
            removed
        })
    }

    /// Replaces a guild's partition with a bulk snapshot.
    ///
    /// Entries missing from the snapshot are dropped, versions of surviving
    /// keys keep growing, and the partition is no longer stale. Entities that
    /// do not belong to the guild are written individually.
    ///
    /// Returns the guild entry's version (0 if guilds are not cached).
    pub fn snapshot(&self, guild: Guild, children: Vec<Entity>) -> u64 {
        let guild_id = guild.id;
        let mut elsewhere = Vec::new();

        let version = {
            let mut slot = self.partitions.entry(guild_id).or_default();
            let old = std::mem::take(&mut *slot);

            let mut version = 0;
            if self.config.stores(EntityKind::Guild) {
                let key = CacheKey::guild(guild_id);
                version = old.guild.as_ref().map_or(1, |g| g.version + 1);
                slot.guild = Some(Arc::new(CachedEntry {
                    key,
                    version,
                    entity: Entity::Guild(guild),
                }));
            }

            for entity in children {
                let key = CacheKey::of(&entity);
                if key.partition() != Some(guild_id) {
                    elsewhere.push(entity);
                    continue;
                }
                if !self.config.stores(key.kind) {
                    continue;
                }
                let child = (key.kind, key.id);
                let child_version = old.children.get(&child).map_or(1, |e| e.version + 1);
                slot.children.insert(
                    child,
                    Arc::new(CachedEntry {
                        key,
                        version: child_version,
                        entity,
                    }),
                );
            }

            debug!(
                guild_id = guild_id.get(),
                children = slot.children.len(),
                was_stale = old.stale,
                "Applied guild snapshot"
            );
            version
        };

        for entity in elsewhere {
            let key = CacheKey::of(&entity);
            if self.config.stores(key.kind) {
                if let Err(e) = self.upsert(key, Update::Full(entity)) {
                    warn!(error = %e, "Snapshot entity not stored");
                }
            }
        }
        version
    }

    /// Returns a point-in-time copy of the entries under `parent`.
    ///
    /// `None` lists root-level entries: guilds, users and direct channels.
    #[must_use]
    pub fn values(&self, parent: Option<GuildId>) -> Values {
        let entries = match parent {
            Some(guild) => self
                .partitions
                .get(&guild)
                .map(|p| p.children.values().cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut entries: Vec<_> = self.roots.iter().map(|e| Arc::clone(e.value())).collect();
                entries.extend(self.partitions.iter().filter_map(|p| p.guild.clone()));
                entries
            }
        };
        Values::new(entries)
    }

    /// Like [`EntityCache::values`], restricted to one kind.
    #[must_use]
    pub fn values_of(&self, parent: Option<GuildId>, kind: EntityKind) -> Values {
        Values::new(
            self.values(parent)
                .into_iter()
                .filter(|e| e.key.kind == kind)
                .collect(),
        )
    }

    /// Applies every write of a decoded event in order.
    ///
    /// Writes for kinds the cache does not store are skipped silently. Other
    /// failures are returned and do not stop the remaining writes.
    pub fn apply(&self, patch: CachePatch) -> Vec<CacheError> {
        let mut errors = Vec::new();
        for op in patch.into_ops() {
            let result = match op {
                CacheOp::Upsert { key, update } => {
                    if !self.config.stores(key.kind) {
                        continue;
                    }
                    self.upsert(key, update).map(drop)
                }
                CacheOp::Remove { key } => {
                    self.remove(&key);
                    Ok(())
                }
                CacheOp::Snapshot { guild, children } => {
                    self.snapshot(guild, children);
                    Ok(())
                }
                CacheOp::SetSelfUser(user) => {
                    self.set_self_user(user);
                    Ok(())
                }
            };
            if let Err(e) = result {
                errors.push(e);
            }
        }
        errors
    }

    /// Marks every guild partition matching `predicate` stale.
    ///
    /// Returns the number of partitions marked.
    pub fn mark_stale(&self, predicate: impl Fn(GuildId) -> bool) -> usize {
        let mut marked = 0;
        for mut partition in self.partitions.iter_mut() {
            if predicate(*partition.key()) {
                partition.stale = true;
                marked += 1;
            }
        }
        marked
    }

    /// Returns true if the guild's contents may have missed events.
    #[must_use]
    pub fn is_stale(&self, guild: GuildId) -> bool {
        self.partitions.get(&guild).is_some_and(|p| p.stale)
    }

    /// Returns the connected account, if known.
    #[must_use]
    pub fn self_user(&self) -> Option<User> {
        self.self_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records the connected account and caches it as a user.
    pub fn set_self_user(&self, user: User) {
        if self.config.stores(EntityKind::User) {
            let key = CacheKey::user(user.id);
            if let Err(e) = self.upsert(key, Update::Full(Entity::User(user.clone()))) {
                warn!(error = %e, "Self user not cached");
            }
        }
        *self.self_user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    /// Returns the connected account's id, if known.
    #[must_use]
    pub fn self_user_id(&self) -> Option<UserId> {
        self.self_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|u| u.id)
    }

    /// Returns the ids of every guild with a partition.
    #[must_use]
    pub fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<_> = self.partitions.iter().map(|p| *p.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Counts entries by kind.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in &self.roots {
            stats.count(entry.value().key.kind);
        }
        for partition in &self.partitions {
            if partition.guild.is_some() {
                stats.guilds += 1;
            }
            if partition.stale {
                stats.stale_guilds += 1;
            }
            for child in partition.children.values() {
                stats.count(child.key.kind);
            }
        }
        stats
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.roots.clear();
        self.partitions.clear();
        *self.self_user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
