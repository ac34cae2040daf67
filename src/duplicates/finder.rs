//! Streaming duplicate-pair finder.
//!
//! Matching is by name and size only; content is never read. The store
//! produces candidate pairs lazily and this layer adds the stale-mirror
//! guard: a pair is surfaced only while both files still exist on disk at
//! their indexed location. Anything else was deleted or moved since the
//! last index run and is silently dropped.

use crate::store::{MirrorStore, StoreError};

use super::{DuplicateFilter, DuplicatePair};

/// Finds duplicate pairs recorded in the mirror.
pub struct DuplicateFinder<'a> {
    store: &'a MirrorStore,
}

impl<'a> DuplicateFinder<'a> {
    /// Create a finder over the given store.
    #[must_use]
    pub fn new(store: &'a MirrorStore) -> Self {
        Self { store }
    }

    /// Visit every duplicate pair passing `filter`, in the order the store
    /// produces them. The sequence is finite and not restartable
    /// mid-stream.
    pub fn for_each<F>(&self, filter: &DuplicateFilter, mut visit: F) -> Result<(), StoreError>
    where
        F: FnMut(&DuplicatePair),
    {
        let mut surfaced = 0u64;
        let mut stale = 0u64;

        self.store.for_each_duplicate(filter, |pair| {
            if !pair.left.file_path(&pair.name).is_file()
                || !pair.right.file_path(&pair.name).is_file()
            {
                stale += 1;
                return;
            }
            surfaced += 1;
            visit(&pair);
        })?;

        log::debug!("duplicate scan: {surfaced} pairs surfaced, {stale} stale pairs dropped");
        Ok(())
    }

    /// Collect every surviving pair. Convenience for non-interactive
    /// callers and tests; the interactive path uses [`Self::for_each`].
    pub fn collect(&self, filter: &DuplicateFilter) -> Result<Vec<DuplicatePair>, StoreError> {
        let mut pairs = Vec::new();
        self.for_each(filter, |pair| pairs.push(pair.clone()))?;
        Ok(pairs)
    }
}
