//! Cache configuration.

use std::collections::BTreeSet;

use crate::entity::EntityKind;

/// Selects which entity kinds the cache stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Kinds to store. Updates for other kinds are ignored.
    pub kinds: BTreeSet<EntityKind>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kinds: EntityKind::ALL.into_iter().collect(),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration storing nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            kinds: BTreeSet::new(),
        }
    }

    /// Creates a configuration storing exactly `kinds`.
    #[must_use]
    pub fn with_kinds(kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// Adds a kind.
    #[must_use]
    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Returns true if `kind` is stored.
    #[must_use]
    pub fn stores(&self, kind: EntityKind) -> bool {
        self.kinds.contains(&kind)
    }
}
