//! File-backed work-key set: persistence, quarantine and rollback.

use dipwatch_core::{Identifier, WorkKey};
use dipwatch_runner::{FileSet, StoreError, WorkSet};
use std::fs;
use std::sync::Arc;
use std::thread;

fn key(id: &str, reference: f64) -> WorkKey {
    WorkKey::new(Identifier::new(id).unwrap(), reference)
}

#[test]
fn missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let set = FileSet::open(dir.path().join("journal.json")).unwrap();
    assert!(set.is_empty());
    assert!(!dir.path().join("journal.json").exists());
}

#[test]
fn survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.json");
    {
        let set = FileSet::open(&path).unwrap();
        assert!(set.add(key("A", 100_000.0)).unwrap());
        assert!(set.add(key("B", 2_500.5)).unwrap());
    }
    let reopened = FileSet::open(&path).unwrap();
    assert_eq!(reopened.snapshot(), vec![key("A", 100_000.0), key("B", 2_500.5)]);
    assert!(reopened.contains(&key("A", 100_000.0)));
    assert!(!reopened.add(key("A", 100_000.0)).unwrap());
}

#[test]
fn file_is_a_flat_array_of_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contracts.json");
    let set = FileSet::open(&path).unwrap();
    set.add(key("So1abc", 50_000.0)).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw, serde_json::json!([["So1abc", 50000.0]]));
    assert!(!dir.path().join("contracts.json.tmp").exists());
}

#[test]
fn loads_existing_pair_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sent_contracts.json");
    fs::write(&path, r#"[["X", 100000], ["Y", 42.5]]"#).unwrap();

    let set = FileSet::open(&path).unwrap();
    assert_eq!(set.snapshot(), vec![key("X", 100_000.0), key("Y", 42.5)]);
}

#[test]
fn corrupt_file_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.json");
    fs::write(&path, "not valid json {{{").unwrap();

    let set = FileSet::open(&path).unwrap();
    assert!(set.is_empty());
    assert!(!path.exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("journal.json.corrupt")).unwrap(),
        "not valid json {{{"
    );

    set.add(key("A", 1.0)).unwrap();
    assert_eq!(FileSet::open(&path).unwrap().len(), 1);
}

#[test]
fn creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("nested").join("journal.json");
    let set = FileSet::open(&path).unwrap();
    set.add(key("A", 1.0)).unwrap();
    assert!(path.exists());
}

#[test]
fn failed_write_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let parent = dir.path().join("state");
    let set = FileSet::open(parent.join("journal.json")).unwrap();
    // a regular file where the parent directory should be
    fs::write(&parent, "").unwrap();

    let err = set.add(key("A", 1.0)).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));
    assert!(!set.contains(&key("A", 1.0)));
    assert!(set.is_empty());
}

#[test]
fn concurrent_adds_insert_once() {
    let dir = tempfile::tempdir().unwrap();
    let set = Arc::new(FileSet::open(dir.path().join("journal.json")).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let set = Arc::clone(&set);
            thread::spawn(move || set.add(key("A", 1.0)).unwrap())
        })
        .collect();
    let inserted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|new| *new)
        .count();

    assert_eq!(inserted, 1);
    assert_eq!(FileSet::open(dir.path().join("journal.json")).unwrap().len(), 1);
}
