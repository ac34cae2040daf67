//! Interactive resolution of duplicate pairs.
//!
//! Each pair runs through a small state machine: a per-directory policy
//! can resolve it immediately, otherwise the pair is presented through an
//! [`ActionSource`] and a single choice is consumed. The source is a
//! synchronous request/response seam so the engine runs against stdin in
//! production and against a scripted list in tests.
//!
//! Deletions happen on the real filesystem only; the mirror is refreshed
//! by the next index run.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use bytesize::ByteSize;
use thiserror::Error;

use crate::store::StoreError;

use super::policy::{FolderAction, FolderPolicies, PolicyDecision};
use super::{DuplicateFilter, DuplicateFinder, DuplicatePair};

/// Which endpoint of a pair an action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The endpoint with the smaller file id.
    Left,
    /// The endpoint with the larger file id.
    Right,
}

/// A single user decision for one presented pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Move on without touching either file.
    DoNothing,
    /// Delete the file on one side.
    Delete(Side),
    /// Remember delete-all for one side's directory and delete the
    /// current file there.
    DeleteAllFrom(Side),
    /// Remember skip-all for one side's directory.
    SkipAllFrom(Side),
    /// Remember delete-all for a whole subtree (path as typed by the
    /// user) and delete the current file on whichever side lies under it.
    DeleteFolderRecursive(String),
    /// Remember skip-all for a whole subtree.
    IgnoreFolderRecursive(String),
}

/// Which sides of the presented pair still need a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Menu {
    /// Left-side options are applicable.
    pub left: bool,
    /// Right-side options are applicable.
    pub right: bool,
}

impl Menu {
    /// True when neither side needs a decision.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.left && !self.right
    }
}

/// Malformed or unavailable interactive input. Logged and contained; the
/// current pair is skipped.
#[derive(Debug, Error)]
pub enum InputError {
    /// Reading from the input failed.
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),

    /// The input did not name a menu option.
    #[error("unrecognized menu choice: {0:?}")]
    Unrecognized(String),

    /// The input stream ended.
    #[error("input stream closed")]
    Closed,
}

/// Source of decisions for presented pairs.
///
/// `menu` tells the implementation which sides still need a decision;
/// the engine accepts any valid choice regardless, mirroring the menu
/// being advisory rather than enforced.
pub trait ActionSource {
    /// Present one pair and obtain a decision.
    fn choose(&mut self, pair: &DuplicatePair, menu: &Menu) -> Result<Choice, InputError>;
}

/// Counters for one resolution session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    /// Pairs shown to the action source.
    pub pairs_presented: u64,
    /// Pairs resolved by a delete-all policy without prompting.
    pub auto_deleted: u64,
    /// Pairs skipped (skip policies on both sides, or bad input).
    pub skipped: u64,
    /// Files removed from disk.
    pub files_deleted: u64,
    /// Emptied directories removed after their last file.
    pub dirs_pruned: u64,
    /// Deletions that failed and were logged.
    pub delete_errors: u64,
}

impl ResolutionStats {
    /// One-line summary for the end of a session.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} presented, {} auto-resolved, {} skipped, {} file(s) deleted, {} empty dir(s) removed",
            self.pairs_presented, self.auto_deleted, self.skipped, self.files_deleted, self.dirs_pruned
        )
    }
}

/// Drives the interactive decision loop over a stream of duplicate pairs.
pub struct ResolutionEngine<'a> {
    source: &'a mut dyn ActionSource,
    policies: FolderPolicies,
    use_trash: bool,
    stats: ResolutionStats,
}

impl<'a> ResolutionEngine<'a> {
    /// Create an engine reading decisions from `source`. With `use_trash`
    /// set, files go to the system trash instead of being removed
    /// permanently.
    pub fn new(source: &'a mut dyn ActionSource, use_trash: bool) -> Self {
        Self {
            source,
            policies: FolderPolicies::new(),
            use_trash,
            stats: ResolutionStats::default(),
        }
    }

    /// Resolve every pair the finder surfaces under `filter`.
    pub fn run(
        &mut self,
        finder: &DuplicateFinder<'_>,
        filter: &DuplicateFilter,
    ) -> Result<ResolutionStats, StoreError> {
        finder.for_each(filter, |pair| self.resolve_pair(pair))?;
        Ok(self.stats)
    }

    /// Run one pair through the decision state machine.
    pub fn resolve_pair(&mut self, pair: &DuplicatePair) {
        let left = self.policies.lookup(&pair.left.dir_path);
        let right = self.policies.lookup(&pair.right.dir_path);

        // Delete-all short-circuits without prompting, left side first.
        if left == Some(PolicyDecision::DeleteAll) {
            self.stats.auto_deleted += 1;
            self.delete_file_and_prune(&pair.left.dir_path.clone(), &pair.name);
            return;
        }
        if right == Some(PolicyDecision::DeleteAll) {
            self.stats.auto_deleted += 1;
            self.delete_file_and_prune(&pair.right.dir_path.clone(), &pair.name);
            return;
        }

        let menu = Menu {
            left: left != Some(PolicyDecision::SkipAll),
            right: right != Some(PolicyDecision::SkipAll),
        };
        if menu.is_empty() {
            self.stats.skipped += 1;
            return;
        }

        self.stats.pairs_presented += 1;
        match self.source.choose(pair, &menu) {
            Ok(choice) => self.apply(pair, choice),
            Err(err) => {
                log::warn!("skipping pair for {}: {err}", pair.name);
                self.stats.skipped += 1;
            }
        }
    }

    fn apply(&mut self, pair: &DuplicatePair, choice: Choice) {
        match choice {
            Choice::DoNothing => {}
            Choice::Delete(side) => {
                self.delete_file_and_prune(&self.side_dir(pair, side).to_path_buf(), &pair.name);
            }
            Choice::DeleteAllFrom(side) => {
                let dir = self.side_dir(pair, side).to_path_buf();
                self.policies
                    .register(&dir.to_string_lossy(), FolderAction::DeleteAll);
                self.delete_file_and_prune(&dir, &pair.name);
            }
            Choice::SkipAllFrom(side) => {
                let dir = self.side_dir(pair, side).to_path_buf();
                self.policies
                    .register(&dir.to_string_lossy(), FolderAction::SkipAll);
            }
            Choice::DeleteFolderRecursive(raw) => {
                if let Some(folder) = self
                    .policies
                    .register(&raw, FolderAction::DeleteAllRecursive)
                {
                    if pair.left.dir_path.starts_with(&folder) {
                        self.delete_file_and_prune(&pair.left.dir_path.clone(), &pair.name);
                    } else if pair.right.dir_path.starts_with(&folder) {
                        self.delete_file_and_prune(&pair.right.dir_path.clone(), &pair.name);
                    }
                }
            }
            Choice::IgnoreFolderRecursive(raw) => {
                self.policies.register(&raw, FolderAction::SkipAllRecursive);
            }
        }
    }

    fn side_dir<'p>(&self, pair: &'p DuplicatePair, side: Side) -> &'p Path {
        match side {
            Side::Left => &pair.left.dir_path,
            Side::Right => &pair.right.dir_path,
        }
    }

    /// Remove one file; if its directory is empty afterwards, remove the
    /// directory too. Failures are logged and never abort the session.
    fn delete_file_and_prune(&mut self, dir: &Path, name: &str) {
        let path = dir.join(name);
        let removed = if self.use_trash {
            trash::delete(&path).map_err(|e| io::Error::other(e.to_string()))
        } else {
            fs::remove_file(&path)
        };

        if let Err(err) = removed {
            log::warn!("failed to delete {}: {err}", path.display());
            self.stats.delete_errors += 1;
            return;
        }
        log::info!("deleted {}", path.display());
        self.stats.files_deleted += 1;

        match fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    match fs::remove_dir(dir) {
                        Ok(()) => {
                            log::info!("removed empty directory {}", dir.display());
                            self.stats.dirs_pruned += 1;
                        }
                        Err(err) => {
                            log::warn!("failed to remove empty {}: {err}", dir.display());
                        }
                    }
                }
            }
            Err(err) => log::debug!("cannot list {} after delete: {err}", dir.display()),
        }
    }
}

/// Console implementation of [`ActionSource`]: prints the pair and the
/// applicable options, then blocks on one line of stdin.
#[derive(Debug, Default)]
pub struct ConsoleSource;

impl ConsoleSource {
    /// Create a console source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn read_line(&self) -> Result<String, InputError> {
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            return Err(InputError::Closed);
        }
        Ok(line.trim().to_string())
    }
}

impl ActionSource for ConsoleSource {
    fn choose(&mut self, pair: &DuplicatePair, menu: &Menu) -> Result<Choice, InputError> {
        println!(
            "File: {} [{}]  f1={}  f2={}",
            pair.name,
            ByteSize::b(pair.size),
            pair.left.file_id,
            pair.right.file_id
        );
        println!(
            "  --> {}  (dir {})",
            pair.left.dir_path.display(),
            pair.left.directory_id
        );
        println!(
            "  --> {}  (dir {})",
            pair.right.dir_path.display(),
            pair.right.directory_id
        );

        if menu.left {
            println!("1. Delete file from left");
            println!("2. Delete all files from left directory");
            println!("3. Ignore all comparisons with left directory");
        }
        if menu.right {
            println!("4. Delete file from right");
            println!("5. Delete all files from right directory");
            println!("6. Ignore all comparisons with right directory");
        }
        println!("7. Delete recursive folder...");
        println!("8. Ignore folder...");
        println!("0. Move to next file (do nothing)");
        let _ = io::stdout().flush();

        let line = self.read_line()?;
        match line.as_str() {
            "0" => Ok(Choice::DoNothing),
            "1" => Ok(Choice::Delete(Side::Left)),
            "2" => Ok(Choice::DeleteAllFrom(Side::Left)),
            "3" => Ok(Choice::SkipAllFrom(Side::Left)),
            "4" => Ok(Choice::Delete(Side::Right)),
            "5" => Ok(Choice::DeleteAllFrom(Side::Right)),
            "6" => Ok(Choice::SkipAllFrom(Side::Right)),
            "7" => {
                println!("Folder to delete recursively:");
                let _ = io::stdout().flush();
                Ok(Choice::DeleteFolderRecursive(self.read_line()?))
            }
            "8" => {
                println!("Folder to ignore:");
                let _ = io::stdout().flush();
                Ok(Choice::IgnoreFolderRecursive(self.read_line()?))
            }
            other => Err(InputError::Unrecognized(other.to_string())),
        }
    }
}

/// Scripted implementation of [`ActionSource`] for tests and automation:
/// answers with a fixed queue of choices and errors once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    choices: VecDeque<Choice>,
}

impl ScriptedSource {
    /// Create a source answering with `choices`, in order.
    #[must_use]
    pub fn new(choices: Vec<Choice>) -> Self {
        Self {
            choices: choices.into(),
        }
    }
}

impl ActionSource for ScriptedSource {
    fn choose(&mut self, _pair: &DuplicatePair, _menu: &Menu) -> Result<Choice, InputError> {
        self.choices.pop_front().ok_or(InputError::Closed)
    }
}
