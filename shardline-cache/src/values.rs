//! Point-in-time views over cache entries.

use std::sync::Arc;

use crate::entity::Entity;
use crate::key::CachedEntry;

/// A copy of the entries under one parent, taken at one instant.
///
/// Later cache writes do not show up here, and the view can be iterated as
/// many times as needed.
#[derive(Debug, Clone, Default)]
pub struct Values {
    entries: Vec<Arc<CachedEntry>>,
}

impl Values {
    pub(crate) fn new(mut entries: Vec<Arc<CachedEntry>>) -> Self {
        entries.sort_by_key(|e| e.key);
        Self { entries }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<CachedEntry>> {
        self.entries.iter()
    }

    /// Iterates over the entities.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entries.iter().map(|e| &e.entity)
    }
}

impl<'a> IntoIterator for &'a Values {
    type Item = &'a Arc<CachedEntry>;
    type IntoIter = std::slice::Iter<'a, Arc<CachedEntry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Values {
    type Item = Arc<CachedEntry>;
    type IntoIter = std::vec::IntoIter<Arc<CachedEntry>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
