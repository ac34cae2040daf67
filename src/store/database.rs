//! SQLite-backed implementation of the mirror store.
//!
//! Uses a single connection with cached prepared statements. Transaction
//! boundaries are explicit: an index run opens a transaction, commits
//! periodically for bounded recovery cost, and commits once more at the
//! end. `commit`/`rollback` are safe no-ops outside a transaction so the
//! application can run them unconditionally on every exit path.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{DirUsage, DirectoryNode, FileRecord, StoreError};
use crate::duplicates::{DuplicateFilter, DuplicatePair, PairSide};

/// How many file rows are buffered before [`MirrorStore::flush_files`]
/// must be called by the indexer. The store itself never flushes
/// implicitly; the batching policy belongs to the caller.
#[derive(Debug, Clone)]
struct PendingFile {
    directory_id: i64,
    name: String,
    size: i64,
    name_hash: i64,
}

/// Persistent directory/file mirror backed by SQLite.
pub struct MirrorStore {
    conn: Connection,
    pending: RefCell<Vec<PendingFile>>,
}

impl MirrorStore {
    /// Open (or create) the mirror database at `path`.
    ///
    /// The schema is created when missing; existing data is preserved.
    /// Use [`MirrorStore::prepare_db`] for a destructive reset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] if the file or its parent directory
    /// cannot be created, and a database error if the schema setup fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_connection(conn)
    }

    /// Open a transient in-memory mirror. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn,
            pending: RefCell::new(Vec::new()),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS Directories(
                 ID       INTEGER PRIMARY KEY,
                 DirPath  TEXT NOT NULL UNIQUE,
                 ParentID INTEGER REFERENCES Directories(ID)
             );
             CREATE TABLE IF NOT EXISTS Files(
                 ID           INTEGER PRIMARY KEY AUTOINCREMENT,
                 DirectoryRef INTEGER NOT NULL REFERENCES Directories(ID),
                 FileName     TEXT NOT NULL,
                 NameHash     INTEGER NOT NULL,
                 Size         INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS FileNameHashIdx ON Files(NameHash);
             CREATE INDEX IF NOT EXISTS FileSizeIdx ON Files(Size);",
        )?;
        Ok(())
    }

    /// Drop and recreate both tables and their indexes. Destructive and
    /// irreversible.
    pub fn prepare_db(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS Files;
             DROP TABLE IF EXISTS Directories;",
        )?;
        self.ensure_schema()
    }

    // ------------------------------------------------------------------
    // Transaction control
    // ------------------------------------------------------------------

    /// Start the transaction for an index run. No-op if one is already
    /// open.
    pub fn begin_index_run(&self) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        Ok(())
    }

    /// Commit the open transaction, if any.
    pub fn commit(&self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Roll back the open transaction, if any. Queued file rows that were
    /// never flushed are discarded as well.
    pub fn rollback(&self) -> Result<(), StoreError> {
        self.pending.borrow_mut().clear();
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Directory rows
    // ------------------------------------------------------------------

    /// Insert a directory row.
    ///
    /// # Errors
    ///
    /// [`StoreError::Constraint`] if `path` already exists in the mirror
    /// or `parent_id` references a missing directory.
    pub fn insert_directory(
        &self,
        id: i64,
        path: &str,
        parent_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO Directories (ID, DirPath, ParentID) VALUES (?1, ?2, ?3)")?;
        stmt.execute(params![id, path, parent_id])
            .map_err(|e| StoreError::from_sqlite(e, format!("inserting directory {path}")))?;
        Ok(())
    }

    /// Look up a directory by its canonical path.
    pub fn find_directory_by_path(&self, path: &str) -> Result<Option<DirectoryNode>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT ID, DirPath, ParentID FROM Directories WHERE DirPath = ?1")?;
        let node = stmt
            .query_row(params![path], |row| {
                Ok(DirectoryNode {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    parent_id: row.get(2)?,
                })
            })
            .optional()?;
        Ok(node)
    }

    /// All immediate children of `parent_id`. Exhaustive; order carries no
    /// meaning.
    pub fn child_directories(&self, parent_id: i64) -> Result<Vec<DirectoryNode>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT ID, DirPath, ParentID FROM Directories WHERE ParentID = ?1")?;
        let rows = stmt.query_map(params![parent_id], |row| {
            Ok(DirectoryNode {
                id: row.get(0)?,
                path: row.get(1)?,
                parent_id: row.get(2)?,
            })
        })?;
        let mut children = Vec::new();
        for row in rows {
            children.push(row?);
        }
        Ok(children)
    }

    /// The next free directory id: `max(ID) + 1`, or `0` for an empty
    /// mirror. Single-writer only; two concurrent callers would race.
    pub fn next_directory_id(&self) -> Result<i64, StoreError> {
        let id = self
            .conn
            .query_row("SELECT COALESCE(MAX(ID) + 1, 0) FROM Directories", [], |row| {
                row.get(0)
            })?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // File rows
    // ------------------------------------------------------------------

    /// Queue one file row for insertion. Nothing is sent to the database
    /// until [`MirrorStore::flush_files`] runs.
    pub fn queue_file(&self, directory_id: i64, name: &str, size: u64, name_hash: i64) {
        self.pending.borrow_mut().push(PendingFile {
            directory_id,
            name: name.to_owned(),
            size: size as i64,
            name_hash,
        });
    }

    /// Number of queued, not yet flushed file rows.
    #[must_use]
    pub fn pending_files(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Send all queued file rows to the database. Independent of commit:
    /// flushed rows still belong to the open transaction.
    ///
    /// Returns the number of rows inserted.
    pub fn flush_files(&self) -> Result<usize, StoreError> {
        let batch: Vec<PendingFile> = self.pending.borrow_mut().drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO Files (DirectoryRef, FileName, Size, NameHash) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for file in &batch {
            stmt.execute(params![file.directory_id, file.name, file.size, file.name_hash])
                .map_err(|e| {
                    StoreError::from_sqlite(e, format!("inserting file {}", file.name))
                })?;
        }
        Ok(batch.len())
    }

    /// Every file row owned by one directory.
    pub fn files_of_directory(&self, directory_id: i64) -> Result<Vec<FileRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT ID, DirectoryRef, FileName, Size, NameHash FROM Files WHERE DirectoryRef = ?1",
        )?;
        let rows = stmt.query_map(params![directory_id], |row| {
            Ok(FileRecord {
                id: row.get(0)?,
                directory_id: row.get(1)?,
                name: row.get(2)?,
                size: row.get::<_, i64>(3)? as u64,
                name_hash: row.get(4)?,
            })
        })?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    // ------------------------------------------------------------------
    // Ordered deletes
    // ------------------------------------------------------------------

    /// Delete every file row of a directory. Returns the number of rows
    /// removed.
    pub fn delete_files_of(&self, directory_id: i64) -> Result<usize, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM Files WHERE DirectoryRef = ?1")?;
        Ok(stmt.execute(params![directory_id])?)
    }

    /// Delete every remaining child row of a directory. Returns the number
    /// of rows removed.
    pub fn delete_children_of(&self, parent_id: i64) -> Result<usize, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM Directories WHERE ParentID = ?1")?;
        Ok(stmt.execute(params![parent_id])?)
    }

    /// Delete one directory row.
    ///
    /// # Errors
    ///
    /// [`StoreError::Integrity`] unless exactly one row was affected; any
    /// other count means the mirror no longer matches what the caller
    /// resolved, for example after an external writer touched the store.
    pub fn delete_directory(&self, id: i64) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("DELETE FROM Directories WHERE ID = ?1")?;
        let affected = stmt.execute(params![id])?;
        if affected != 1 {
            return Err(StoreError::Integrity(format!(
                "deleting directory id {id} affected {affected} rows, expected 1"
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derived-view queries
    // ------------------------------------------------------------------

    /// Visit every candidate duplicate pair: equal name, equal size above
    /// the filter's minimum, `f1.ID < f2.ID` so each pair surfaces exactly
    /// once. Rows are visited as the statement produces them; the stream
    /// is not restartable.
    pub fn for_each_duplicate<F>(
        &self,
        filter: &DuplicateFilter,
        mut visit: F,
    ) -> Result<(), StoreError>
    where
        F: FnMut(DuplicatePair),
    {
        let mut sql = String::from(
            "SELECT f1.ID, f2.ID, f1.FileName, f1.Size,
                    d1.ID, d1.DirPath, d2.ID, d2.DirPath
             FROM Files f1
             JOIN Files f2 ON f2.Size = f1.Size
                          AND f2.FileName = f1.FileName
                          AND f1.ID < f2.ID
             JOIN Directories d1 ON d1.ID = f1.DirectoryRef
             JOIN Directories d2 ON d2.ID = f2.DirectoryRef
             WHERE f1.Size > ?1",
        );
        let mut values = vec![Value::Integer(filter.min_size_bytes as i64)];

        if !filter.extensions.is_empty() {
            let clauses: Vec<String> = filter
                .extensions
                .iter()
                .enumerate()
                .map(|(i, _)| format!("f1.FileName LIKE ?{}", i + 2))
                .collect();
            sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
            for ext in &filter.extensions {
                values.push(Value::Text(format!("%.{ext}")));
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        while let Some(row) = rows.next()? {
            visit(DuplicatePair {
                name: row.get(2)?,
                size: row.get::<_, i64>(3)? as u64,
                left: PairSide {
                    file_id: row.get(0)?,
                    directory_id: row.get(4)?,
                    dir_path: PathBuf::from(row.get::<_, String>(5)?),
                },
                right: PairSide {
                    file_id: row.get(1)?,
                    directory_id: row.get(6)?,
                    dir_path: PathBuf::from(row.get::<_, String>(7)?),
                },
            });
        }
        Ok(())
    }

    /// Files whose name case-insensitively contains every one of the given
    /// substrings. Returns `(directory path, file name)` pairs.
    pub fn locate(&self, substrings: &[String]) -> Result<Vec<(String, String)>, StoreError> {
        let mut sql = String::from(
            "SELECT d.DirPath, f.FileName
             FROM Files f JOIN Directories d ON d.ID = f.DirectoryRef
             WHERE 1=1",
        );
        let mut values = Vec::new();
        for (i, term) in substrings.iter().enumerate() {
            sql.push_str(&format!(" AND LOWER(f.FileName) LIKE ?{}", i + 1));
            values.push(Value::Text(format!("%{}%", term.to_lowercase())));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }

    /// Per-directory aggregate file size in whole megabytes, largest
    /// first, for directories at or above `min_dir_mb`.
    pub fn directory_usage(&self, min_dir_mb: u64) -> Result<Vec<DirUsage>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT d.DirPath, agg.SizeMB
             FROM (SELECT DirectoryRef AS DirRef, SUM(Size) / (1024 * 1024) AS SizeMB
                   FROM Files GROUP BY DirectoryRef) agg
             JOIN Directories d ON d.ID = agg.DirRef
             WHERE agg.SizeMB >= ?1
             ORDER BY agg.SizeMB DESC",
        )?;
        let rows = stmt.query_map(params![min_dir_mb as i64], |row| {
            Ok(DirUsage {
                path: row.get(0)?,
                size_mb: row.get::<_, i64>(1)? as u64,
            })
        })?;
        let mut usage = Vec::new();
        for row in rows {
            usage.push(row?);
        }
        Ok(usage)
    }

    /// Total size of every mirrored file, in whole megabytes.
    pub fn total_size_mb(&self) -> Result<u64, StoreError> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(Size), 0) / (1024 * 1024) FROM Files",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::name_hash;

    fn store() -> MirrorStore {
        MirrorStore::open_in_memory().unwrap()
    }

    #[test]
    fn next_directory_id_starts_at_zero() {
        let s = store();
        assert_eq!(s.next_directory_id().unwrap(), 0);
    }

    #[test]
    fn next_directory_id_is_max_plus_one() {
        let s = store();
        s.insert_directory(0, "/a", None).unwrap();
        s.insert_directory(7, "/a/b", Some(0)).unwrap();
        assert_eq!(s.next_directory_id().unwrap(), 8);
    }

    #[test]
    fn insert_and_find_directory() {
        let s = store();
        s.insert_directory(0, "/data", None).unwrap();
        s.insert_directory(1, "/data/sub", Some(0)).unwrap();

        let root = s.find_directory_by_path("/data").unwrap().unwrap();
        assert_eq!(root.id, 0);
        assert_eq!(root.parent_id, None);

        let sub = s.find_directory_by_path("/data/sub").unwrap().unwrap();
        assert_eq!(sub.parent_id, Some(0));

        assert!(s.find_directory_by_path("/missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_path_is_a_constraint_violation() {
        let s = store();
        s.insert_directory(0, "/data", None).unwrap();
        let err = s.insert_directory(1, "/data", None).unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }), "got {err:?}");
    }

    #[test]
    fn missing_parent_is_a_constraint_violation() {
        let s = store();
        let err = s.insert_directory(0, "/orphan", Some(42)).unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }), "got {err:?}");
    }

    #[test]
    fn queued_files_are_not_visible_until_flushed() {
        let s = store();
        s.insert_directory(0, "/d", None).unwrap();
        s.queue_file(0, "a.txt", 10, name_hash("a.txt"));
        s.queue_file(0, "b.txt", 20, name_hash("b.txt"));
        assert_eq!(s.pending_files(), 2);
        assert_eq!(s.total_size_mb().unwrap(), 0);

        assert_eq!(s.flush_files().unwrap(), 2);
        assert_eq!(s.pending_files(), 0);
        assert_eq!(s.delete_files_of(0).unwrap(), 2);
    }

    #[test]
    fn delete_directory_requires_exactly_one_row() {
        let s = store();
        s.insert_directory(0, "/d", None).unwrap();
        s.delete_directory(0).unwrap();
        let err = s.delete_directory(0).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)), "got {err:?}");
    }

    #[test]
    fn child_directories_are_exhaustive() {
        let s = store();
        s.insert_directory(0, "/r", None).unwrap();
        s.insert_directory(1, "/r/a", Some(0)).unwrap();
        s.insert_directory(2, "/r/b", Some(0)).unwrap();
        s.insert_directory(3, "/r/a/c", Some(1)).unwrap();

        let mut ids: Vec<i64> = s
            .child_directories(0)
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn rollback_discards_queued_and_uncommitted_rows() {
        let s = store();
        s.insert_directory(0, "/r", None).unwrap();
        s.commit().unwrap();

        s.begin_index_run().unwrap();
        s.insert_directory(1, "/r/a", Some(0)).unwrap();
        s.queue_file(0, "x", 1, name_hash("x"));
        s.rollback().unwrap();

        assert_eq!(s.pending_files(), 0);
        assert!(s.find_directory_by_path("/r/a").unwrap().is_none());
        assert!(s.find_directory_by_path("/r").unwrap().is_some());
    }

    #[test]
    fn locate_matches_all_terms_case_insensitively() {
        let s = store();
        s.insert_directory(0, "/music", None).unwrap();
        s.queue_file(0, "Holiday-Mix.mp3", 1, name_hash("Holiday-Mix.mp3"));
        s.queue_file(0, "notes.txt", 1, name_hash("notes.txt"));
        s.flush_files().unwrap();

        let hits = s
            .locate(&["holiday".to_string(), "MIX".to_string()])
            .unwrap();
        assert_eq!(hits, vec![("/music".to_string(), "Holiday-Mix.mp3".to_string())]);

        let none = s.locate(&["holiday".to_string(), "txt".to_string()]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn prepare_db_clears_everything() {
        let s = store();
        s.insert_directory(0, "/d", None).unwrap();
        s.queue_file(0, "a", 1, 0);
        s.flush_files().unwrap();

        s.prepare_db().unwrap();
        assert_eq!(s.next_directory_id().unwrap(), 0);
        assert_eq!(s.total_size_mb().unwrap(), 0);
    }
}
