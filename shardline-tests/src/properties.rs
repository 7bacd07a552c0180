//! Cache properties and their checkers.
//!
//! A [`CacheModel`] replays the same writes as an [`EntityCache`] with plain
//! collections. [`check_cache`] compares the two and reports the first
//! [`PropertyViolation`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use shardline_cache::{CacheKey, EntityCache, EntityKind};
use shardline_core::{GuildId, UserId};

/// A way the cache disagrees with its model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// An entry's version is not the number of writes since it was created.
    VersionMismatch {
        /// The entry.
        key: CacheKey,
        /// Writes counted by the model.
        expected: u64,
        /// Version held by the cache.
        actual: u64,
    },
    /// The model holds a key the cache lost.
    MissingEntry {
        /// The key.
        key: CacheKey,
    },
    /// The cache holds a key the model removed or never wrote.
    UnexpectedEntry {
        /// The key.
        key: CacheKey,
    },
}

impl fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionMismatch {
                key,
                expected,
                actual,
            } => write!(f, "{key}: expected version {expected}, found {actual}"),
            Self::MissingEntry { key } => write!(f, "{key}: missing from cache"),
            Self::UnexpectedEntry { key } => write!(f, "{key}: should not be cached"),
        }
    }
}

/// Reference model of the member and user entries of a cache.
#[derive(Debug, Clone, Default)]
pub struct CacheModel {
    versions: BTreeMap<CacheKey, u64>,
}

impl CacheModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a full write to `key`.
    pub fn write(&mut self, key: CacheKey) {
        *self.versions.entry(key).or_insert(0) += 1;
    }

    /// Records a removal of `key`. Removing a guild drops its partition.
    pub fn remove(&mut self, key: CacheKey) {
        if key.kind == EntityKind::Guild {
            let guild = key.id;
            self.versions
                .retain(|k, _| *k != key && k.parent != Some(guild));
        } else {
            self.versions.remove(&key);
        }
    }

    /// Records a snapshot of `guild` containing exactly `members`.
    pub fn snapshot(&mut self, guild: GuildId, members: &BTreeSet<UserId>) {
        self.versions.retain(|k, _| {
            k.parent != Some(guild.snowflake())
                || (k.kind == EntityKind::Member && members.contains(&UserId::new(k.id.get())))
        });
        self.write(CacheKey::guild(guild));
        for &user in members {
            self.write(CacheKey::member(guild, user));
            self.write(CacheKey::user(user));
        }
    }

    /// Keys the model holds.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> + '_ {
        self.versions.keys()
    }
}

/// Compares every key the model knows, plus every guild-scoped entry the
/// cache holds for the model's guilds.
///
/// # Errors
///
/// Returns the first disagreement found.
pub fn check_cache(cache: &EntityCache, model: &CacheModel) -> Result<(), PropertyViolation> {
    for (&key, &expected) in &model.versions {
        let entry = cache
            .get(&key)
            .ok_or(PropertyViolation::MissingEntry { key })?;
        if entry.version != expected {
            return Err(PropertyViolation::VersionMismatch {
                key,
                expected,
                actual: entry.version,
            });
        }
    }

    for guild in cache.guild_ids() {
        for entry in &cache.values(Some(guild)) {
            if !model.versions.contains_key(&entry.key) {
                return Err(PropertyViolation::UnexpectedEntry { key: entry.key });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use shardline_cache::{CacheConfig, Entity, Guild, Member, Update, User};
    use shardline_flow::Route;
    use shardline_gateway::{shard_for, ShardAssignment};

    use super::*;

    const GUILD: GuildId = GuildId::new(100);

    #[derive(Debug, Clone)]
    enum Op {
        AddMember(u64),
        RemoveMember(u64),
        Snapshot(BTreeSet<u64>),
        DeleteGuild,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (1..8u64).prop_map(Op::AddMember),
            2 => (1..8u64).prop_map(Op::RemoveMember),
            1 => prop::collection::btree_set(1..8u64, 0..5).prop_map(Op::Snapshot),
            1 => Just(Op::DeleteGuild),
        ]
    }

    fn user(id: UserId) -> User {
        User {
            id,
            username: format!("user{id}"),
            global_name: None,
            avatar: None,
            bot: false,
        }
    }

    fn member(user_id: UserId) -> Member {
        Member {
            guild_id: GUILD,
            user_id,
            nick: None,
            roles: Vec::new(),
            joined_at: None,
            pending: false,
        }
    }

    fn guild() -> Guild {
        Guild {
            id: GUILD,
            name: "g".to_string(),
            owner_id: UserId::new(1),
            icon: None,
            member_count: None,
            unavailable: false,
        }
    }

    fn apply(cache: &EntityCache, model: &mut CacheModel, op: &Op) {
        match op {
            Op::AddMember(id) => {
                let id = UserId::new(*id);
                let key = CacheKey::member(GUILD, id);
                cache
                    .upsert(key, Update::Full(Entity::Member(member(id))))
                    .unwrap();
                model.write(key);
            }
            Op::RemoveMember(id) => {
                let key = CacheKey::member(GUILD, UserId::new(*id));
                cache.remove(&key);
                model.remove(key);
            }
            Op::Snapshot(ids) => {
                let members: BTreeSet<UserId> = ids.iter().map(|&id| UserId::new(id)).collect();
                let children = members
                    .iter()
                    .flat_map(|&id| [Entity::User(user(id)), Entity::Member(member(id))])
                    .collect();
                cache.snapshot(guild(), children);
                model.snapshot(GUILD, &members);
            }
            Op::DeleteGuild => {
                let key = CacheKey::guild(GUILD);
                cache.remove(&key);
                model.remove(key);
            }
        }
    }

    proptest! {
        #[test]
        fn test_cache_matches_model(ops in prop::collection::vec(op(), 1..40)) {
            let cache = EntityCache::new(CacheConfig::default());
            let mut model = CacheModel::new();
            for op in &ops {
                apply(&cache, &mut model, op);
                if let Err(violation) = check_cache(&cache, &model) {
                    prop_assert!(false, "after {:?}: {}", op, violation);
                }
            }
        }

        #[test]
        fn test_minor_ids_share_a_bucket(channel in 1..u64::MAX, a in 1..u64::MAX, b in 1..u64::MAX) {
            let first = Route::get(format!("/channels/{channel}/messages/{a}"));
            let second = Route::delete(format!("/channels/{channel}/messages/{b}"));
            let (first_group, second_group) = (first.group(), second.group());
            prop_assert_eq!(
                first_group.trim_start_matches("GET "),
                second_group.trim_start_matches("DELETE ")
            );
            let with_query = Route::get(format!("/channels/{channel}/messages/{a}?limit=5"));
            prop_assert_eq!(with_query.group(), first.group());
        }

        #[test]
        fn test_major_ids_split_buckets(a in 1..u64::MAX, b in 1..u64::MAX) {
            prop_assume!(a != b);
            let first = Route::get(format!("/guilds/{a}/members"));
            let second = Route::get(format!("/guilds/{b}/members"));
            prop_assert_ne!(first.group(), second.group());
        }

        #[test]
        fn test_assigned_shards_cover_every_guild_once(
            total in 1..16u32,
            split in 0..16u32,
            guild in any::<u64>(),
        ) {
            let split = split % total;
            let mut owners = 0;
            for assignment in [
                ShardAssignment::Range { start: 0, end: split.max(1) },
                ShardAssignment::Range { start: split.max(1), end: total },
            ] {
                if let Ok(indices) = assignment.indices(total) {
                    if indices.contains(&shard_for(guild, total)) {
                        owners += 1;
                    }
                }
            }
            prop_assert_eq!(owners, 1);
        }
    }
}
