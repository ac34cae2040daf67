//! Duplicate detection and interactive resolution.
//!
//! Duplicates are file records sharing name and size across different
//! mirrored directories. The [`finder`] streams candidate pairs out of the
//! store, the [`policy`] cache remembers per-directory decisions for the
//! session, and the [`resolver`] drives the interactive loop that turns
//! decisions into filesystem deletions.

pub mod finder;
pub mod policy;
pub mod resolver;

pub use finder::DuplicateFinder;
pub use policy::{FolderAction, FolderPolicies, PolicyDecision};
pub use resolver::{
    ActionSource, Choice, ConsoleSource, InputError, Menu, ResolutionEngine, ResolutionStats,
    ScriptedSource, Side,
};

use std::path::PathBuf;

/// One endpoint of a duplicate pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSide {
    /// File record id.
    pub file_id: i64,
    /// Owning directory id.
    pub directory_id: i64,
    /// Owning directory path.
    pub dir_path: PathBuf,
}

impl PairSide {
    /// Full path of the file on this side.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir_path.join(name)
    }
}

/// Two file records with equal name and size in different directories.
///
/// The left side always carries the smaller file id, so a pair never
/// appears twice under swapped orderings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePair {
    /// Shared file name.
    pub name: String,
    /// Shared size in bytes.
    pub size: u64,
    /// Side with the smaller file id.
    pub left: PairSide,
    /// Side with the larger file id.
    pub right: PairSide,
}

/// Filter applied when querying for duplicate candidates.
#[derive(Debug, Clone, Default)]
pub struct DuplicateFilter {
    /// Only files strictly larger than this take part.
    pub min_size_bytes: u64,
    /// If non-empty, only names ending in `.<ext>` for one of these
    /// extensions take part.
    pub extensions: Vec<String>,
}

impl DuplicateFilter {
    /// Build a filter from a size threshold in megabytes and a list of
    /// extension suffixes.
    #[must_use]
    pub fn new(min_size_mb: u64, extensions: Vec<String>) -> Self {
        Self {
            min_size_bytes: min_size_mb * 1024 * 1024,
            extensions,
        }
    }
}
