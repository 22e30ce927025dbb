//! Attestation store: per-tree records, atomic writes, soft reads.

mod common;

use std::fs;

use common::{MemoryTrees, lines};
use lrc_core::attestation::{AttestationStore, ensure_attestation};
use lrc_core::types::{Action, AttestationRecord, CoverageResult};
use lrc_core::Error;

fn store_in(dir: &tempfile::TempDir) -> AttestationStore {
    AttestationStore::new(dir.path().join("lrc").join("attestations"))
}

fn record(action: Action) -> AttestationRecord {
    AttestationRecord {
        action,
        iterations: 2,
        prior_ai_coverage_pct: 66.7,
        prior_review_count: 1,
    }
}

fn files_in(store: &AttestationStore) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(store.dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn record_is_scoped_to_its_tree() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);

    let path = store.write("t1", &record(Action::Reviewed)).unwrap();
    assert_eq!(path, store.path_for("t1"));

    assert_eq!(store.read("t1"), Some(record(Action::Reviewed)));
    assert_eq!(store.read("t2"), None);
}

#[test]
fn force_rerun_replaces_record_without_leftovers() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);

    store.write("t1", &record(Action::Skipped)).unwrap();
    store.delete("t1").unwrap();
    assert_eq!(store.read("t1"), None);

    store.write("t1", &record(Action::Reviewed)).unwrap();
    store.write("t1", &record(Action::Vouched)).unwrap();

    assert_eq!(files_in(&store), vec!["t1.json".to_owned()]);
    assert_eq!(store.read("t1").map(|r| r.action), Some(Action::Vouched));
}

#[test]
fn malformed_record_reads_as_absent() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::create_dir_all(store.dir()).unwrap();

    fs::write(store.path_for("t1"), b"{\"action\": \"review").unwrap();
    assert_eq!(store.read("t1"), None);

    fs::write(store.path_for("t2"), br#"{"action": "approved"}"#).unwrap();
    assert_eq!(store.read("t2"), None);
}

#[test]
fn missing_counters_default_to_zero() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::create_dir_all(store.dir()).unwrap();

    fs::write(store.path_for("t1"), br#"{"action": "skipped"}"#).unwrap();
    let read = store.read("t1").unwrap();
    assert_eq!(read.action, Action::Skipped);
    assert_eq!(read.iterations, 0);
    assert_eq!(read.trailer(), "LiveReview Pre-Commit Check: skipped");
}

#[test]
fn record_serializes_with_stable_field_names() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);

    let path = store.write("t1", &record(Action::Reviewed)).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    assert_eq!(json["action"], "reviewed");
    assert_eq!(json["iterations"], 2);
    assert_eq!(json["prior_ai_coverage_pct"], 66.7);
    assert_eq!(json["prior_review_count"], 1);
}

#[test]
fn deleting_missing_record_is_ok() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);

    store.delete("never-written").unwrap();
    store.delete("").unwrap();
}

#[test]
fn empty_tree_hash_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);

    let err = store.write("", &record(Action::Reviewed)).unwrap_err();
    assert!(matches!(err, Error::EmptyTreeHash));
    assert_eq!(store.read(""), None);
}

#[test]
fn write_failure_is_reported_and_leaves_no_temp_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);

    // A directory squatting on the final path makes the rename fail.
    fs::create_dir_all(store.path_for("t1")).unwrap();
    fs::write(store.path_for("t1").join("keep"), b"x").unwrap();

    let err = store.write("t1", &record(Action::Reviewed)).unwrap_err();
    assert!(matches!(err, Error::AttestationWrite { .. }), "got {err:?}");
    assert_eq!(files_in(&store), vec!["t1.json".to_owned()]);
}

#[test]
fn unwritable_directory_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let parent = dir.path().join("lrc");
    fs::write(&parent, b"not a directory").unwrap();
    let store = AttestationStore::new(parent.join("attestations"));

    let err = store.write("t1", &record(Action::Reviewed)).unwrap_err();
    assert!(matches!(err, Error::AttestationWrite { .. }), "got {err:?}");
}

#[test]
fn current_tree_helpers_follow_the_identity() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);
    let trees = MemoryTrees::new("main");
    trees.add_tree("t1", &[("a.rs", lines("a", 1..=3))]);
    trees.set_current("t1");

    assert_eq!(store.existing_action(&trees), None);
    store.write_for_current_tree(&trees, &record(Action::Vouched)).unwrap();
    assert_eq!(store.existing_action(&trees), Some(Action::Vouched));

    // A new tree is not attested by the old record
    trees.set_current("t2");
    assert_eq!(store.existing_action(&trees), None);
    assert!(store.read("t1").is_some());

    trees.set_current("t1");
    store.delete_for_current_tree(&trees).unwrap();
    assert_eq!(store.read_for_current_tree(&trees), None);
}

#[test]
fn ensure_attestation_writes_once_per_invocation() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);
    let trees = MemoryTrees::new("main");
    trees.set_current("t1");

    let coverage = CoverageResult {
        iterations: 3,
        prior_ai_coverage_pct: 50.0,
        covered_lines: 10,
        total_lines: 20,
        prior_review_count: 2,
    };

    let mut written = false;
    let first = ensure_attestation(&store, &trees, Action::Reviewed, &coverage, &mut written).unwrap();
    assert_eq!(first, Some(store.path_for("t1")));
    assert!(written);

    // A second call in the same invocation is a no-op
    let second = ensure_attestation(&store, &trees, Action::Skipped, &coverage, &mut written).unwrap();
    assert_eq!(second, None);

    let stored = store.read("t1").unwrap();
    assert_eq!(stored.action, Action::Reviewed);
    assert_eq!(stored.iterations, 3);
    assert_eq!(stored.prior_review_count, 2);
    assert_eq!(
        stored.trailer(),
        "LiveReview Pre-Commit Check: ran (iter:3, coverage:50%)"
    );
}

#[test]
fn ensure_attestation_clamps_iterations() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = store_in(&dir);
    let trees = MemoryTrees::new("main");
    trees.set_current("t1");

    let mut written = false;
    ensure_attestation(&store, &trees, Action::Skipped, &CoverageResult::default(), &mut written)
        .unwrap();
    assert_eq!(store.read("t1").map(|r| r.iterations), Some(1));
}

#[test]
fn ensure_attestation_failure_leaves_guard_unset() {
    let dir = tempfile::TempDir::new().unwrap();
    let blocker = dir.path().join("lrc");
    fs::write(&blocker, b"not a directory").unwrap();
    let store = AttestationStore::new(blocker.join("attestations"));
    let trees = MemoryTrees::new("main");
    trees.set_current("t1");

    let mut written = false;
    let result = ensure_attestation(&store, &trees, Action::Reviewed, &CoverageResult::neutral(), &mut written);
    assert!(result.is_err());
    assert!(!written);
}
