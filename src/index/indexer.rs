//! Depth-first indexing of a real filesystem subtree into the mirror.
//!
//! # Identifier assignment
//!
//! The root claims `next_directory_id()`; every subdirectory claims the
//! next id by pre-increment at the moment it is first visited. Ids
//! therefore strictly increase in visit order and a directory's id is
//! always smaller than the ids of all directories created under it. Ids
//! are never block-reserved ahead of the walk.
//!
//! # Staleness
//!
//! The root's old mirror is erased before indexing, and every
//! subdirectory is defensively re-erased before it is inserted: a path
//! that disappeared and reappeared between runs (moves, renames, restores
//! from backup) would otherwise leave stale descendants behind. Each
//! erase runs between its own commits, so the deletion work survives even
//! if the surrounding index run aborts.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::progress::ProgressSink;
use crate::store::{name_hash, MirrorStore, StoreError};

use super::{IndexError, SubtreeEraser};

/// Queued file rows between statement flushes.
const FLUSH_EVERY: u64 = 200;
/// Files between transaction commits.
const COMMIT_EVERY: u64 = 2000;

/// Result of one completed index run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    /// Id assigned to the (re-)indexed root.
    pub root_id: i64,
    /// Files written to the mirror.
    pub files: u64,
    /// Directories written to the mirror, root included.
    pub directories: u64,
    /// Entries skipped because of I/O errors (logged, non-fatal).
    pub skipped: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Walks a real subtree and mirrors it through the store.
pub struct Indexer<'a> {
    store: &'a MirrorStore,
    progress: &'a dyn ProgressSink,
    flush_every: u64,
    commit_every: u64,
}

impl<'a> Indexer<'a> {
    /// Create an indexer with the default batching policy.
    #[must_use]
    pub fn new(store: &'a MirrorStore, progress: &'a dyn ProgressSink) -> Self {
        Self {
            store,
            progress,
            flush_every: FLUSH_EVERY,
            commit_every: COMMIT_EVERY,
        }
    }

    /// Override the flush/commit intervals. Values are clamped to at
    /// least 1.
    #[must_use]
    pub fn with_batching(mut self, flush_every: u64, commit_every: u64) -> Self {
        self.flush_every = flush_every.max(1);
        self.commit_every = commit_every.max(1);
        self
    }

    /// Index (or re-index) the subtree rooted at `root`.
    ///
    /// Returns counters for the run. Storage failures abort the run with
    /// a rollback of the open transaction; I/O failures on individual
    /// entries are logged and skipped.
    pub fn index_root(&self, root: &Path) -> Result<IndexOutcome, IndexError> {
        let started = Instant::now();

        let root = fs::canonicalize(root).map_err(|e| IndexError::RootAccess {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !root.is_dir() {
            return Err(IndexError::RootAccess {
                path: root,
                source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            });
        }
        let root_str = root.to_string_lossy().into_owned();
        log::info!("indexing {root_str}");

        let mut eraser = SubtreeEraser::new(self.store, self.progress);
        let parent_id = self
            .erase_between_commits(&mut eraser, &root_str)?
            .flatten();

        let root_id = self.store.next_directory_id()?;

        let mut outcome = IndexOutcome {
            root_id,
            files: 0,
            directories: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
        };

        let walked = self.walk_tree(&root, &root_str, root_id, parent_id, &mut eraser, &mut outcome);
        if let Err(err) = walked {
            let _ = self.store.rollback();
            return Err(err);
        }

        self.store.flush_files()?;
        self.store.commit()?;

        outcome.elapsed = started.elapsed();
        log::info!(
            "indexed {} files in {} directories under {root_str} in {:.2}s",
            outcome.files,
            outcome.directories,
            outcome.elapsed.as_secs_f64()
        );
        Ok(outcome)
    }

    fn walk_tree(
        &self,
        root: &Path,
        root_str: &str,
        root_id: i64,
        parent_id: Option<i64>,
        eraser: &mut SubtreeEraser<'_>,
        outcome: &mut IndexOutcome,
    ) -> Result<(), IndexError> {
        self.store.insert_directory(root_id, root_str, parent_id)?;
        outcome.directories = 1;

        // Ids of the directories on the current walk path, indexed by
        // depth. Entries at depth d have their parent at d - 1.
        let mut dir_stack: Vec<i64> = vec![root_id];
        let mut next_id = root_id;
        let mut chunk_started = Instant::now();

        let mut entries = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter();

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let at = err
                        .path()
                        .map_or_else(|| root_str.to_owned(), |p| p.display().to_string());
                    log::warn!("listing failed at {at}: {err}, continuing");
                    outcome.skipped += 1;
                    continue;
                }
            };

            let path = entry.path();
            let is_dir = entry.file_type().is_dir();

            // Symlink-cycle guard: skip anything whose canonical form
            // differs from the path it was reached by.
            match path.canonicalize() {
                Ok(canonical) if canonical == path => {}
                Ok(_) => {
                    log::trace!("skipping link {}", path.display());
                    if is_dir {
                        entries.skip_current_dir();
                    }
                    continue;
                }
                Err(err) => {
                    log::warn!("cannot resolve {}: {err}, skipping", path.display());
                    outcome.skipped += 1;
                    if is_dir {
                        entries.skip_current_dir();
                    }
                    continue;
                }
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    log::warn!("cannot read metadata of {}: {err}, skipping", path.display());
                    outcome.skipped += 1;
                    if is_dir {
                        entries.skip_current_dir();
                    }
                    continue;
                }
            };

            let depth = entry.depth();
            if metadata.is_dir() {
                let path_str = path.to_string_lossy();
                // A stale mirror of this exact path may survive from an
                // earlier run of a different root.
                self.erase_between_commits(eraser, &path_str)?;

                dir_stack.truncate(depth);
                let parent = dir_stack[depth - 1];
                next_id += 1;
                self.store.insert_directory(next_id, &path_str, Some(parent))?;
                dir_stack.push(next_id);
                outcome.directories += 1;
            } else if metadata.is_file() {
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('.') {
                    continue;
                }

                let parent = dir_stack[depth - 1];
                self.store
                    .queue_file(parent, &name, metadata.len(), name_hash(&name));
                outcome.files += 1;

                if outcome.files % self.flush_every == 0 {
                    self.store.flush_files()?;
                    self.progress.on_files(outcome.files);
                }
                if outcome.files % self.commit_every == 0 {
                    self.store.flush_files()?;
                    self.store.commit()?;
                    self.store.begin_index_run()?;
                    self.progress.on_commit(outcome.files);
                    log::debug!(
                        "processed {} files [{}ms]",
                        outcome.files,
                        chunk_started.elapsed().as_millis()
                    );
                    chunk_started = Instant::now();
                }
            }
            // Anything else (sockets, fifos, devices) is not mirrored.
        }

        Ok(())
    }

    /// Run a subtree erase between its own commit boundaries, restoring
    /// the index-run transaction afterwards.
    fn erase_between_commits(
        &self,
        eraser: &mut SubtreeEraser<'_>,
        path: &str,
    ) -> Result<Option<Option<i64>>, StoreError> {
        self.store.commit()?;
        self.store.begin_index_run()?;
        let parent = eraser.erase(path)?;
        self.store.commit()?;
        self.store.begin_index_run()?;
        Ok(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &[u8]) {
        File::create(path).unwrap().write_all(content).unwrap();
    }

    /// `root/{a/x.txt, a/y.txt, b/x.txt}`
    fn sample_tree() -> TempDir {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("a")).unwrap();
        std::fs::create_dir(root.path().join("b")).unwrap();
        write_file(&root.path().join("a").join("x.txt"), b"0123456789");
        write_file(&root.path().join("a").join("y.txt"), b"01234");
        write_file(&root.path().join("b").join("x.txt"), b"0123456789");
        root
    }

    fn canonical_str(path: &Path) -> String {
        fs::canonicalize(path).unwrap().to_string_lossy().into_owned()
    }

    fn all_files(store: &MirrorStore) -> Vec<(String, String)> {
        let mut files = store.locate(&[]).unwrap();
        files.sort();
        files
    }

    #[test]
    fn indexes_directories_with_monotonic_ids() {
        let tree = sample_tree();
        let store = MirrorStore::open_in_memory().unwrap();
        let outcome = Indexer::new(&store, &NoProgress)
            .index_root(tree.path())
            .unwrap();

        assert_eq!(outcome.files, 3);
        assert_eq!(outcome.directories, 3);
        assert_eq!(outcome.skipped, 0);

        let root = store
            .find_directory_by_path(&canonical_str(tree.path()))
            .unwrap()
            .unwrap();
        assert_eq!(root.id, outcome.root_id);
        assert_eq!(root.parent_id, None);

        for sub in ["a", "b"] {
            let node = store
                .find_directory_by_path(&canonical_str(&tree.path().join(sub)))
                .unwrap()
                .unwrap();
            assert_eq!(node.parent_id, Some(root.id));
            assert!(node.id > root.id, "child id must exceed parent id");
        }
    }

    #[test]
    fn hidden_files_are_skipped_but_hidden_directories_are_not() {
        let tree = sample_tree();
        write_file(&tree.path().join("a").join(".hidden"), b"secret");
        std::fs::create_dir(tree.path().join(".config")).unwrap();
        write_file(&tree.path().join(".config").join("v.txt"), b"v");

        let store = MirrorStore::open_in_memory().unwrap();
        Indexer::new(&store, &NoProgress)
            .index_root(tree.path())
            .unwrap();

        let names: Vec<String> = all_files(&store).into_iter().map(|(_, n)| n).collect();
        assert!(!names.contains(&".hidden".to_string()));
        assert!(names.contains(&"v.txt".to_string()));
        assert!(store
            .find_directory_by_path(&canonical_str(&tree.path().join(".config")))
            .unwrap()
            .is_some());
    }

    #[test]
    fn reindexing_is_idempotent() {
        let tree = sample_tree();
        let store = MirrorStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&store, &NoProgress);

        indexer.index_root(tree.path()).unwrap();
        let first = all_files(&store);

        let outcome = indexer.index_root(tree.path()).unwrap();
        let second = all_files(&store);

        assert_eq!(first, second);
        assert_eq!(outcome.files, 3);
        // The old root was erased, so no directory row is duplicated.
        assert_eq!(
            store
                .child_directories(outcome.root_id)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn reindex_after_on_disk_deletion_drops_stale_rows() {
        let tree = sample_tree();
        let store = MirrorStore::open_in_memory().unwrap();
        let indexer = Indexer::new(&store, &NoProgress);

        indexer.index_root(tree.path()).unwrap();
        let a_path = canonical_str(&tree.path().join("a"));

        std::fs::remove_dir_all(tree.path().join("a")).unwrap();
        let outcome = indexer.index_root(tree.path()).unwrap();

        assert_eq!(outcome.files, 1);
        assert!(store.find_directory_by_path(&a_path).unwrap().is_none());
        let files = all_files(&store);
        assert_eq!(files.len(), 1);
        assert!(files[0].0.ends_with("b"));
    }

    #[test]
    fn small_batching_intervals_still_index_everything() {
        let tree = sample_tree();
        let store = MirrorStore::open_in_memory().unwrap();
        let outcome = Indexer::new(&store, &NoProgress)
            .with_batching(1, 2)
            .index_root(tree.path())
            .unwrap();

        assert_eq!(outcome.files, 3);
        assert_eq!(all_files(&store).len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_entries_are_not_mirrored() {
        let tree = sample_tree();
        std::os::unix::fs::symlink(tree.path().join("a"), tree.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(
            tree.path().join("a").join("x.txt"),
            tree.path().join("x-link.txt"),
        )
        .unwrap();

        let store = MirrorStore::open_in_memory().unwrap();
        let outcome = Indexer::new(&store, &NoProgress)
            .index_root(tree.path())
            .unwrap();

        assert_eq!(outcome.files, 3);
        assert_eq!(outcome.directories, 3);
        assert!(store
            .find_directory_by_path(&canonical_str(&tree.path().join("loop")))
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_root_is_a_fatal_error() {
        let store = MirrorStore::open_in_memory().unwrap();
        let err = Indexer::new(&store, &NoProgress)
            .index_root(Path::new("/no/such/root"))
            .unwrap_err();
        assert!(matches!(err, IndexError::RootAccess { .. }), "got {err:?}");
    }
}
