//! Recursive removal of a mirrored subtree.
//!
//! Deletion is bottom-up: a node's files go first, then its children
//! recursively, then the node itself. Each node removal must hit exactly
//! one row; anything else means the mirror diverged under us and the
//! erase aborts with [`StoreError::Integrity`].
//!
//! Erasing is idempotent: re-erasing a partially erased subtree simply
//! completes the remainder, which is the designated recovery path after a
//! crash mid-erase.

use crate::progress::ProgressSink;
use crate::store::{MirrorStore, StoreError};

/// How many node removals between progress notifications.
const ERASE_TICK: u64 = 200;

/// Deletes a mirrored directory and all of its descendants.
pub struct SubtreeEraser<'a> {
    store: &'a MirrorStore,
    progress: &'a dyn ProgressSink,
    erased: u64,
}

impl<'a> SubtreeEraser<'a> {
    /// Create an eraser over the given store.
    pub fn new(store: &'a MirrorStore, progress: &'a dyn ProgressSink) -> Self {
        Self {
            store,
            progress,
            erased: 0,
        }
    }

    /// Erase the subtree rooted at the mirrored directory with canonical
    /// path `path`.
    ///
    /// Returns `None` when the path is not mirrored at all (a no-op, as
    /// when indexing a brand-new root); otherwise `Some(parent_id)` of the
    /// erased node, so a re-index can link the fresh root under the same
    /// parent. The parent id itself is `None` for a top-level root.
    pub fn erase(&mut self, path: &str) -> Result<Option<Option<i64>>, StoreError> {
        let Some(node) = self.store.find_directory_by_path(path)? else {
            return Ok(None);
        };
        log::debug!("erasing mirrored subtree at {path} (id {})", node.id);
        self.erase_node(node.id)?;
        Ok(Some(node.parent_id))
    }

    fn erase_node(&mut self, id: i64) -> Result<(), StoreError> {
        self.store.delete_files_of(id)?;
        for child in self.store.child_directories(id)? {
            self.erase_node(child.id)?;
        }
        // The recursion already removed each child row individually; this
        // sweep guards against rows the traversal could not reach.
        self.store.delete_children_of(id)?;
        self.store.delete_directory(id)?;

        self.erased += 1;
        if self.erased % ERASE_TICK == 0 {
            self.progress.on_erased(self.erased);
        }
        Ok(())
    }

    /// Directories erased by this eraser so far.
    #[must_use]
    pub fn erased(&self) -> u64 {
        self.erased
    }
}
