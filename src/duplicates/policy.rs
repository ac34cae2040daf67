//! Per-directory decision cache for the resolution session.
//!
//! Decisions the user makes for a whole directory (delete everything,
//! skip everything, optionally for the entire subtree) are remembered here
//! so later pairs under the same directory resolve without prompting.
//!
//! The cache is a recency-ordered list, not a true LRU: lookups scan
//! linearly, and a hit found beyond the second position is moved to the
//! front. Directories that keep producing pairs therefore stay near the
//! head while the scan cost stays amortized. The list has no size bound;
//! sessions only ever accumulate a handful of policies.

use std::path::{Path, PathBuf};

/// A remembered per-directory decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderAction {
    /// Delete every file this directory contributes to a pair.
    DeleteAll,
    /// Skip every pair this directory takes part in.
    SkipAll,
    /// [`FolderAction::DeleteAll`], applied to the whole subtree.
    DeleteAllRecursive,
    /// [`FolderAction::SkipAll`], applied to the whole subtree.
    SkipAllRecursive,
}

/// What a lookup resolved to for one specific directory.
///
/// Recursive policies resolve to their non-recursive counterpart; the
/// stored entry stays recursive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Delete this directory's file without asking.
    DeleteAll,
    /// Skip pairs involving this directory without asking.
    SkipAll,
}

/// Threshold beyond which a hit is pulled to the front of the list.
/// Hits in the first three slots stay put to avoid constant swapping
/// between a small working set.
const REORDER_BEYOND: usize = 2;

/// Recency-ordered list of folder policies.
#[derive(Debug, Default)]
pub struct FolderPolicies {
    entries: Vec<(PathBuf, FolderAction)>,
}

impl FolderPolicies {
    /// Create an empty policy list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no policy is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the policy applying to `path`, if any.
    ///
    /// A recursive entry matches `path` and every descendant; an exact
    /// entry matches only itself. The first matching entry in recency
    /// order wins.
    pub fn lookup(&mut self, path: &Path) -> Option<PolicyDecision> {
        let mut hit: Option<(usize, PolicyDecision)> = None;

        for (idx, (entry_path, action)) in self.entries.iter().enumerate() {
            let decision = match action {
                FolderAction::DeleteAllRecursive if path.starts_with(entry_path) => {
                    Some(PolicyDecision::DeleteAll)
                }
                FolderAction::SkipAllRecursive if path.starts_with(entry_path) => {
                    Some(PolicyDecision::SkipAll)
                }
                FolderAction::DeleteAll if path == entry_path => Some(PolicyDecision::DeleteAll),
                FolderAction::SkipAll if path == entry_path => Some(PolicyDecision::SkipAll),
                _ => None,
            };
            if let Some(decision) = decision {
                hit = Some((idx, decision));
                break;
            }
        }

        let (idx, decision) = hit?;
        if idx > REORDER_BEYOND {
            let entry = self.entries.remove(idx);
            self.entries.insert(0, entry);
        }
        Some(decision)
    }

    /// Register a policy for `raw` (as typed by the user).
    ///
    /// The path is trimmed and stripped of a trailing separator, and must
    /// name an existing directory on disk; otherwise nothing is stored and
    /// `None` is returned. Registering a path that already has an entry
    /// replaces its action in place.
    pub fn register(&mut self, raw: &str, action: FolderAction) -> Option<PathBuf> {
        let trimmed = raw.trim().trim_end_matches(std::path::MAIN_SEPARATOR);
        if trimmed.is_empty() {
            return None;
        }

        let path = PathBuf::from(trimmed);
        if !path.is_dir() {
            log::warn!("not a directory, ignoring policy for {}", path.display());
            return None;
        }

        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| *p == path) {
            entry.1 = action;
        } else {
            self.entries.insert(0, (path.clone(), action));
        }
        Some(path)
    }

    #[cfg(test)]
    fn paths(&self) -> Vec<&Path> {
        self.entries.iter().map(|(p, _)| p.as_path()).collect()
    }
}
