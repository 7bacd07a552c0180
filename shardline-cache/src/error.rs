//! Cache error types.

use crate::entity::EntityKind;
use crate::key::CacheKey;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from cache writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// A partial update arrived for an entry the cache does not hold.
    #[error("stale patch for {key}: no entry to merge onto")]
    StalePatch {
        /// The key the patch targeted.
        key: CacheKey,
    },

    /// The key and the payload name different entity kinds.
    #[error("kind mismatch for {key}: payload is a {actual}")]
    KindMismatch {
        /// The key.
        key: CacheKey,
        /// The payload's kind.
        actual: EntityKind,
    },

    /// The cache is configured not to store this kind.
    #[error("{kind} entries are not cached")]
    KindDisabled {
        /// The disabled kind.
        kind: EntityKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardline_core::{GuildId, UserId};

    #[test]
    fn test_stale_patch_display() {
        let err = CacheError::StalePatch {
            key: CacheKey::member(GuildId::new(1), UserId::new(2)),
        };
        assert_eq!(err.to_string(), "stale patch for member:2@1: no entry to merge onto");
    }
}
