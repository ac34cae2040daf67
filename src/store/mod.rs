//! Persistent mirror storage.
//!
//! The mirror is a relational snapshot of one or more filesystem subtrees:
//! a `Directories` table holding the tree structure and a `Files` table
//! holding per-directory file records. All SQL lives behind
//! [`MirrorStore`]; the indexing and query layers never touch the
//! connection directly.
//!
//! # Identifier ownership
//!
//! The store owns the integer address space for both tables. Directory ids
//! are handed out by [`MirrorStore::next_directory_id`] and assigned by the
//! caller; file ids are auto-assigned on insert. A single writer is
//! assumed throughout.

pub mod database;

pub use database::MirrorStore;

use std::path::PathBuf;

use thiserror::Error;

/// One mirrored directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Unique, monotonically assigned identifier.
    pub id: i64,
    /// Absolute canonical path, unique across the mirror.
    pub path: String,
    /// Parent directory id; `None` for an indexed root.
    pub parent_id: Option<i64>,
}

/// One mirrored file, owned by a [`DirectoryNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Auto-assigned identifier.
    pub id: i64,
    /// Owning directory id.
    pub directory_id: i64,
    /// File name without any path component.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Secondary-index hash of the name. Advisory only.
    pub name_hash: i64,
}

/// Aggregate size of one directory, as reported by the usage query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirUsage {
    /// Directory path.
    pub path: String,
    /// Sum of the directory's file sizes, in whole megabytes.
    pub size_mb: u64,
}

/// Errors produced by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or reference constraint failed on insert. Aborts the
    /// current index run.
    #[error("constraint violation while {context}: {message}")]
    Constraint {
        /// Operation that was being performed.
        context: String,
        /// Underlying database message.
        message: String,
    },

    /// A deletion affected an unexpected number of rows, signalling that
    /// the mirror and the filesystem have diverged. Aborts the current
    /// erase.
    #[error("mirror integrity error: {0}")]
    Integrity(String),

    /// The backing database could not be opened.
    #[error("cannot open mirror database at {path}: {message}")]
    Open {
        /// Database location.
        path: PathBuf,
        /// Underlying message.
        message: String,
    },

    /// Any other database error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Map a rusqlite error to [`StoreError::Constraint`] when it is a
    /// constraint failure, attaching the given operation context.
    pub(crate) fn from_sqlite(err: rusqlite::Error, context: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, ref msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Constraint {
                    context: context.into(),
                    message: msg.clone().unwrap_or_else(|| e.to_string()),
                }
            }
            other => Self::Sqlite(other),
        }
    }
}

/// Hash a file name for the `NameHash` secondary index.
///
/// The value narrows candidate scans; it is never used to decide equality.
#[must_use]
pub fn name_hash(name: &str) -> i64 {
    xxhash_rust::xxh3::xxh3_64(name.as_bytes()) as i64
}
