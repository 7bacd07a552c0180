//! Batches of cache writes produced by decoding one event.

use crate::entity::{Entity, Guild, Patch, User};
use crate::key::{CacheKey, Update};

/// One cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    /// Write one key.
    Upsert {
        /// Target key.
        key: CacheKey,
        /// Full or partial payload.
        update: Update,
    },
    /// Remove one key. Removing a guild removes everything under it.
    Remove {
        /// Target key.
        key: CacheKey,
    },
    /// Replace a guild's whole partition with a bulk snapshot.
    Snapshot {
        /// The guild.
        guild: Guild,
        /// Channels, roles, members and presences of the guild.
        children: Vec<Entity>,
    },
    /// Record the connected account.
    SetSelfUser(User),
}

/// The cache writes implied by one event, applied in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachePatch {
    ops: Vec<CacheOp>,
}

impl CachePatch {
    /// Creates an empty patch.
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns the writes.
    #[must_use]
    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    /// Consumes the patch, returning its writes.
    #[must_use]
    pub fn into_ops(self) -> Vec<CacheOp> {
        self.ops
    }

    /// Appends a write.
    pub fn push(&mut self, op: CacheOp) {
        self.ops.push(op);
    }

    /// Appends a full replacement of `entity`, keyed by its own ids.
    pub fn replace(&mut self, entity: Entity) {
        self.ops.push(CacheOp::Upsert {
            key: CacheKey::of(&entity),
            update: Update::Full(entity),
        });
    }

    /// Appends a partial update of `key`.
    pub fn merge(&mut self, key: CacheKey, patch: Patch) {
        self.ops.push(CacheOp::Upsert {
            key,
            update: Update::Partial(patch),
        });
    }

    /// Appends a removal.
    pub fn remove(&mut self, key: CacheKey) {
        self.ops.push(CacheOp::Remove { key });
    }

    /// Builder form of [`CachePatch::push`].
    #[must_use]
    pub fn with(mut self, op: CacheOp) -> Self {
        self.ops.push(op);
        self
    }
}

impl FromIterator<CacheOp> for CachePatch {
    fn from_iter<I: IntoIterator<Item = CacheOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}
