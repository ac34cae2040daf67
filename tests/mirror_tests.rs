//! End-to-end tests over a real temp filesystem and a file-backed mirror.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use diskdex::duplicates::{
    Choice, DuplicateFilter, DuplicateFinder, ResolutionEngine, ScriptedSource, Side,
};
use diskdex::index::Indexer;
use diskdex::progress::NoProgress;
use diskdex::store::MirrorStore;
use diskdex::usage::UsageReport;

fn write_bytes(path: &Path, len: usize) {
    File::create(path).unwrap().write_all(&vec![b'x'; len]).unwrap();
}

/// The layout from the duplicate scenario: `data/a/x.txt` (10 bytes),
/// `data/b/x.txt` (10 bytes), `data/a/y.txt` (5 bytes).
fn scenario_tree() -> TempDir {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("a")).unwrap();
    fs::create_dir(root.path().join("b")).unwrap();
    write_bytes(&root.path().join("a").join("x.txt"), 10);
    write_bytes(&root.path().join("b").join("x.txt"), 10);
    write_bytes(&root.path().join("a").join("y.txt"), 5);
    root
}

fn canonical(path: &Path) -> String {
    fs::canonicalize(path).unwrap().to_string_lossy().into_owned()
}

#[test]
fn duplicate_scenario_yields_exactly_one_pair() {
    let data = scenario_tree();
    let store = MirrorStore::open_in_memory().unwrap();
    Indexer::new(&store, &NoProgress)
        .index_root(data.path())
        .unwrap();

    let pairs = DuplicateFinder::new(&store)
        .collect(&DuplicateFilter::new(0, vec![]))
        .unwrap();

    assert_eq!(pairs.len(), 1, "only x.txt is duplicated");
    let pair = &pairs[0];
    assert_eq!(pair.name, "x.txt");
    assert_eq!(pair.size, 10);
    assert!(pair.left.file_id < pair.right.file_id);

    let dirs = [
        pair.left.dir_path.to_string_lossy().into_owned(),
        pair.right.dir_path.to_string_lossy().into_owned(),
    ];
    assert!(dirs.contains(&canonical(&data.path().join("a"))));
    assert!(dirs.contains(&canonical(&data.path().join("b"))));
}

#[test]
fn reindex_after_disk_deletion_leaves_no_stale_rows() {
    let data = scenario_tree();
    let db_dir = TempDir::new().unwrap();
    let store = MirrorStore::open(&db_dir.path().join("mirror.db")).unwrap();
    let indexer = Indexer::new(&store, &NoProgress);

    indexer.index_root(data.path()).unwrap();
    let a_path = canonical(&data.path().join("a"));
    assert!(store.find_directory_by_path(&a_path).unwrap().is_some());

    fs::remove_dir_all(data.path().join("a")).unwrap();
    indexer.index_root(data.path()).unwrap();

    assert!(store.find_directory_by_path(&a_path).unwrap().is_none());
    for (dir, _name) in store.locate(&[]).unwrap() {
        assert_ne!(dir, a_path, "no file row may reference the deleted subtree");
    }
}

/// `(name, size)` multiset of one directory's files, by canonical path.
fn dir_files(store: &MirrorStore, path: &Path) -> Vec<(String, u64)> {
    let node = store
        .find_directory_by_path(&canonical(path))
        .unwrap()
        .unwrap();
    let mut files: Vec<(String, u64)> = store
        .files_of_directory(node.id)
        .unwrap()
        .into_iter()
        .map(|f| (f.name, f.size))
        .collect();
    files.sort();
    files
}

#[test]
fn reindexing_twice_gives_identical_per_directory_contents() {
    let data = scenario_tree();
    let store = MirrorStore::open_in_memory().unwrap();
    let indexer = Indexer::new(&store, &NoProgress);

    indexer.index_root(data.path()).unwrap();
    let first_a = dir_files(&store, &data.path().join("a"));
    let first_b = dir_files(&store, &data.path().join("b"));

    indexer.index_root(data.path()).unwrap();
    assert_eq!(dir_files(&store, &data.path().join("a")), first_a);
    assert_eq!(dir_files(&store, &data.path().join("b")), first_b);

    assert_eq!(
        first_a,
        vec![("x.txt".to_string(), 10), ("y.txt".to_string(), 5)]
    );
    assert_eq!(first_b, vec![("x.txt".to_string(), 10)]);
    assert_eq!(store.locate(&[]).unwrap().len(), 3);
}

#[test]
fn mirror_persists_across_reopen() {
    let data = scenario_tree();
    let db_dir = TempDir::new().unwrap();
    let db_path = db_dir.path().join("mirror.db");

    {
        let store = MirrorStore::open(&db_path).unwrap();
        Indexer::new(&store, &NoProgress)
            .index_root(data.path())
            .unwrap();
    }

    let store = MirrorStore::open(&db_path).unwrap();
    assert_eq!(store.locate(&[]).unwrap().len(), 3);
    assert!(store
        .find_directory_by_path(&canonical(data.path()))
        .unwrap()
        .is_some());
}

#[test]
fn locate_requires_every_term() {
    let data = scenario_tree();
    let store = MirrorStore::open_in_memory().unwrap();
    Indexer::new(&store, &NoProgress)
        .index_root(data.path())
        .unwrap();

    let hits = store.locate(&["X.".to_string(), "txt".to_string()]).unwrap();
    assert_eq!(hits.len(), 2, "x.txt exists in both directories");

    let none = store.locate(&["x.".to_string(), "y.".to_string()]).unwrap();
    assert!(none.is_empty());
}

#[test]
fn resolution_deletes_one_side_and_mirror_refreshes_on_reindex() {
    let data = scenario_tree();
    let store = MirrorStore::open_in_memory().unwrap();
    let indexer = Indexer::new(&store, &NoProgress);
    indexer.index_root(data.path()).unwrap();

    let finder = DuplicateFinder::new(&store);
    let mut source = ScriptedSource::new(vec![Choice::Delete(Side::Left)]);
    let mut engine = ResolutionEngine::new(&mut source, false);
    let stats = engine
        .run(&finder, &DuplicateFilter::new(0, vec![]))
        .unwrap();

    assert_eq!(stats.files_deleted, 1);
    let a_has = data.path().join("a").join("x.txt").exists();
    let b_has = data.path().join("b").join("x.txt").exists();
    assert!(a_has ^ b_has, "exactly one copy must survive");

    // The mirror only refreshes on the next index run; after one, the
    // surviving copy no longer pairs with anything.
    indexer.index_root(data.path()).unwrap();
    let pairs = finder.collect(&DuplicateFilter::new(0, vec![])).unwrap();
    assert!(pairs.is_empty());
}

#[test]
fn usage_report_percentages_and_coverage_are_consistent() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("big")).unwrap();
    fs::create_dir(root.path().join("small")).unwrap();
    write_bytes(&root.path().join("big").join("blob.bin"), 3 * 1024 * 1024);
    write_bytes(&root.path().join("small").join("blob.bin"), 1024 * 1024);

    let store = MirrorStore::open_in_memory().unwrap();
    Indexer::new(&store, &NoProgress)
        .index_root(root.path())
        .unwrap();

    let total_mb = store.total_size_mb().unwrap();
    assert_eq!(total_mb, 4);

    let narrow = UsageReport::build(store.directory_usage(2).unwrap(), total_mb);
    assert_eq!(narrow.rows.len(), 1);
    assert!(narrow.rows[0].path.ends_with("big"));

    let wide = UsageReport::build(store.directory_usage(0).unwrap(), total_mb);
    assert_eq!(wide.rows.len(), 2);
    // Largest first, all within the grand total, coverage monotone in
    // the threshold.
    assert!(wide.rows[0].size_mb >= wide.rows[1].size_mb);
    assert!(wide.covered_percent <= 100.0);
    assert!(wide.covered_percent >= narrow.covered_percent);
}

#[test]
fn extension_filter_restricts_pairs_end_to_end() {
    let root = TempDir::new().unwrap();
    for sub in ["a", "b"] {
        fs::create_dir(root.path().join(sub)).unwrap();
        write_bytes(&root.path().join(sub).join("song.mp3"), 64);
        write_bytes(&root.path().join(sub).join("note.txt"), 64);
    }

    let store = MirrorStore::open_in_memory().unwrap();
    Indexer::new(&store, &NoProgress)
        .index_root(root.path())
        .unwrap();

    let finder = DuplicateFinder::new(&store);
    let mp3_only = finder
        .collect(&DuplicateFilter::new(0, vec!["mp3".to_string()]))
        .unwrap();
    assert_eq!(mp3_only.len(), 1);
    assert_eq!(mp3_only[0].name, "song.mp3");

    let all = finder.collect(&DuplicateFilter::new(0, vec![])).unwrap();
    assert_eq!(all.len(), 2);
}
