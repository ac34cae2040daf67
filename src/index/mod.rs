//! Indexing a filesystem subtree into the mirror.
//!
//! An index run first erases any stale mirror of the root (so renames,
//! moves and deletions that happened outside the tool never leave
//! descendants behind), then walks the real tree depth-first, writing
//! directory and file rows through the store with periodic flushes and
//! commits.

pub mod eraser;
pub mod indexer;

pub use eraser::SubtreeEraser;
pub use indexer::{IndexOutcome, Indexer};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// Errors that abort an index run.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The root itself could not be resolved or read. Unlike errors on
    /// entries inside the tree, this one is fatal for the run.
    #[error("cannot index {path}: {source}")]
    RootAccess {
        /// The offending root.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A storage-layer failure. Aborts the run; the connection stays
    /// usable for subsequent commands.
    #[error(transparent)]
    Store(#[from] StoreError),
}
