//! Shardline Cache - a consistent, partial mirror of remote entities.
//!
//! The cache stores versioned snapshots of guilds and everything that lives
//! inside them (channels, roles, members, presences) plus guild-less entities
//! such as users. It is fed by decoded gateway events and read by anything
//! that needs entity state without a round trip.
//!
//! # Layout
//!
//! Entries are grouped into one partition per guild. A partition holds the
//! guild's own entry and all of its children, so removing a guild removes
//! everything under it in a single step and readers never observe a guild
//! that is gone while its members remain.
//!
//! ```text
//! EntityCache
//!   roots:      (kind, id)  -> CachedEntry        users, DM channels
//!   partitions: GuildId     -> Partition
//!                               guild:    CachedEntry
//!                               children: (kind, id) -> CachedEntry
//!                               stale:    bool
//! ```
//!
//! # Updates
//!
//! - [`Update::Full`] replaces the stored snapshot.
//! - [`Update::Partial`] merges field by field onto an existing snapshot and
//!   fails with [`CacheError::StalePatch`] when there is nothing to merge onto.
//!
//! Every write bumps the entry's version by one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cache;
mod config;
mod entity;
mod error;
mod key;
mod patch;
mod values;

pub use cache::{CacheStats, EntityCache};
pub use config::CacheConfig;
pub use entity::{
    Channel, ChannelPatch, Entity, EntityKind, Guild, GuildPatch, Member, MemberPatch, Patch,
    Presence, PresencePatch, Role, RolePatch, User, UserPatch,
};
pub use error::{CacheError, CacheResult};
pub use key::{CacheKey, CachedEntry, Update};
pub use patch::{CacheOp, CachePatch};
pub use values::Values;
