//! Cache keys, stored entries and update payloads.

use std::fmt;

use shardline_core::{ChannelId, GuildId, RoleId, Snowflake, UserId};

use crate::entity::{Entity, EntityKind, Patch};

/// Identifies one cache entry.
///
/// `parent` is the owning guild for guild-scoped entities and `None` for
/// guilds themselves, users and direct channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity id (the user id for members and presences).
    pub id: Snowflake,
    /// Owning guild.
    pub parent: Option<Snowflake>,
}

impl CacheKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(kind: EntityKind, id: Snowflake, parent: Option<Snowflake>) -> Self {
        Self { kind, id, parent }
    }

    /// Key of a guild.
    #[must_use]
    pub const fn guild(id: GuildId) -> Self {
        Self::new(EntityKind::Guild, id.snowflake(), None)
    }

    /// Key of a channel; `guild` is `None` for direct channels.
    #[must_use]
    pub const fn channel(guild: Option<GuildId>, id: ChannelId) -> Self {
        let parent = match guild {
            Some(g) => Some(g.snowflake()),
            None => None,
        };
        Self::new(EntityKind::Channel, id.snowflake(), parent)
    }

    /// Key of a role.
    #[must_use]
    pub const fn role(guild: GuildId, id: RoleId) -> Self {
        Self::new(EntityKind::Role, id.snowflake(), Some(guild.snowflake()))
    }

    /// Key of a member.
    #[must_use]
    pub const fn member(guild: GuildId, user: UserId) -> Self {
        Self::new(EntityKind::Member, user.snowflake(), Some(guild.snowflake()))
    }

    /// Key of a user.
    #[must_use]
    pub const fn user(id: UserId) -> Self {
        Self::new(EntityKind::User, id.snowflake(), None)
    }

    /// Key of a presence.
    #[must_use]
    pub const fn presence(guild: GuildId, user: UserId) -> Self {
        Self::new(EntityKind::Presence, user.snowflake(), Some(guild.snowflake()))
    }

    /// Returns the key an entity is stored under.
    #[must_use]
    pub const fn of(entity: &Entity) -> Self {
        let parent = match entity.guild_id() {
            Some(g) => Some(g.snowflake()),
            None => None,
        };
        Self::new(entity.kind(), entity.id(), parent)
    }

    /// Returns the guild partition this key lives in, if any.
    ///
    /// A guild's own key lives in its partition.
    #[must_use]
    pub const fn partition(&self) -> Option<GuildId> {
        match (self.kind, self.parent) {
            (EntityKind::Guild, _) => Some(GuildId::new(self.id.get())),
            (_, Some(parent)) => Some(GuildId::new(parent.get())),
            (_, None) => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "{}:{}@{}", self.kind, self.id, parent),
            None => write!(f, "{}:{}", self.kind, self.id),
        }
    }
}

/// A versioned snapshot held by the cache.
///
/// Entries are immutable once stored; a write replaces the whole entry with
/// a new version, so readers holding an `Arc` keep a consistent view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    /// Where the entry is stored.
    pub key: CacheKey,
    /// Starts at 1 and grows by one with every write to the key.
    pub version: u64,
    /// The snapshot.
    pub entity: Entity,
}

/// A write to one cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Replace the snapshot.
    Full(Entity),
    /// Merge onto the existing snapshot.
    Partial(Patch),
}

impl Update {
    /// Returns the kind the update carries.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Full(entity) => entity.kind(),
            Self::Partial(patch) => patch.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_of_keys() {
        let g = GuildId::new(5);
        assert_eq!(CacheKey::guild(g).partition(), Some(g));
        assert_eq!(CacheKey::role(g, RoleId::new(9)).partition(), Some(g));
        assert_eq!(CacheKey::user(UserId::new(9)).partition(), None);
        assert_eq!(CacheKey::channel(None, ChannelId::new(3)).partition(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(CacheKey::guild(GuildId::new(5)).to_string(), "guild:5");
        assert_eq!(
            CacheKey::presence(GuildId::new(5), UserId::new(6)).to_string(),
            "presence:6@5"
        );
    }
}
