//! Snapshot and restore tests.
//!
//! These tests verify that backups survive partial failure: one bad file
//! never aborts a batch, and broken snapshots fail loudly only for the
//! restore that touches them.

use std::fs;
use std::time::Duration;

use quorum::backup::{BackupManager, MANIFEST_FILE};
use quorum::diff::{DiffEngine, DiffStats, FileDiff};
use quorum::extract::FileOperationKind;
use quorum::Error;

use crate::fixtures::TestTree;

fn manager(tree: &TestTree) -> BackupManager {
    BackupManager::new(&tree.root, &tree.backup_root)
}

fn create(path: &str, content: &str) -> FileDiff {
    FileDiff {
        operation: FileOperationKind::Create,
        path: path.to_string(),
        language: None,
        old_content: None,
        new_content: Some(content.to_string()),
        unified_diff: String::new(),
        stats: DiffStats::between(None, Some(content)),
    }
}

/// Test: pruning keeps the newest
/// Given 5 backups taken in sequence
/// When pruning to 2
/// Then the 2 most recent remain and 3 are removed
#[tokio::test]
async fn test_prune_keeps_most_recent() {
    let tree = TestTree::new();
    tree.write("a.txt", "a");
    let backups = manager(&tree);

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(backups.create_backup(&[tree.path("a.txt")]).unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(backups.prune_backups(2), 3);
    let remaining: Vec<String> = backups
        .list_backups()
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(remaining, vec![ids[4].clone(), ids[3].clone()]);
    assert_eq!(backups.latest_backup().as_deref(), Some(ids[4].as_str()));
}

/// Test: partial restore
/// Given a backup of two files that were both changed afterwards
/// When restoring only one of them
/// Then the other keeps its new content
#[test]
fn test_restore_subset() {
    let tree = TestTree::new();
    tree.write("src/a.py", "a1");
    tree.write("src/b.py", "b1");
    let backups = manager(&tree);

    let id = backups.create_backup(&["src/a.py", "src/b.py"]).unwrap();
    tree.write("src/a.py", "a2");
    tree.write("src/b.py", "b2");

    let report = backups
        .restore_backup(&id, Some(&["src/b.py"][..]))
        .unwrap();
    assert_eq!(report.restored, vec!["src/b.py"]);
    assert_eq!(tree.read("src/a.py").as_deref(), Some("a2"));
    assert_eq!(tree.read("src/b.py").as_deref(), Some("b1"));
}

/// Test: one stored file lost
/// Given a backup whose copy of one file was deleted
/// When restoring
/// Then the other file is restored and the lost one is reported
#[test]
fn test_restore_continues_past_missing_copy() {
    let tree = TestTree::new();
    tree.write("a.txt", "a1");
    tree.write("b.txt", "b1");
    let backups = manager(&tree);

    let id = backups.create_backup(&["a.txt", "b.txt"]).unwrap();
    let manifest = backups.manifest(&id).unwrap();
    let lost = manifest
        .files
        .iter()
        .find(|f| f.original_path == "a.txt")
        .unwrap();
    fs::remove_file(tree.backup_root.join(&id).join(&lost.backup_path)).unwrap();
    tree.write("a.txt", "a2");
    tree.write("b.txt", "b2");

    let report = backups.restore_backup::<&str>(&id, None).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.restored, vec!["b.txt"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, "a.txt");
    assert_eq!(tree.read("a.txt").as_deref(), Some("a2"));
    assert_eq!(tree.read("b.txt").as_deref(), Some("b1"));
}

/// Test: broken snapshots
#[test]
fn test_missing_backup_and_manifest_are_errors() {
    let tree = TestTree::new();
    tree.write("a.txt", "a");
    let backups = manager(&tree);

    let err = backups.restore_backup::<&str>("backup_nope", None).unwrap_err();
    assert!(matches!(err, Error::BackupNotFound(_)));

    let err = backups.restore_backup::<&str>("../outside", None).unwrap_err();
    assert!(matches!(err, Error::BackupNotFound(_)));

    let id = backups.create_backup(&["a.txt"]).unwrap();
    fs::remove_file(tree.backup_root.join(&id).join(MANIFEST_FILE)).unwrap();
    let err = backups.restore_backup::<&str>(&id, None).unwrap_err();
    assert!(matches!(err, Error::ManifestMissing(_)));
    assert!(backups.list_backups().unwrap().is_empty());
}

/// Test: one unwritable target
/// Given a batch where one target path is an existing directory
/// When applying
/// Then that file fails and the rest of the batch is written
#[test]
fn test_apply_continues_past_failed_file() {
    let tree = TestTree::new();
    fs::create_dir_all(tree.path("occupied")).unwrap();
    let engine = DiffEngine::new(&tree.root);

    let report = engine.apply_changes(
        &[
            create("first.txt", "1"),
            create("occupied", "blocked"),
            create("nested/last.txt", "3"),
        ],
        false,
    );

    assert_eq!(report.success, vec!["first.txt", "nested/last.txt"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, "occupied");
    assert_eq!(report.total(), 3);
    assert_eq!(tree.read("nested/last.txt").as_deref(), Some("3"));
}

/// Test: backups ignore what they cannot see
#[test]
fn test_backup_skips_missing_and_outside_paths() {
    let tree = TestTree::new();
    tree.write("kept.txt", "k");
    fs::write(tree.temp_dir.path().join("secret.txt"), "s").unwrap();
    let backups = manager(&tree);

    let id = backups
        .create_backup(&["kept.txt", "absent.txt", "../secret.txt"])
        .unwrap();
    let manifest = backups.manifest(&id).unwrap();
    assert_eq!(manifest.files.len(), 1);
    assert_eq!(manifest.files[0].original_path, "kept.txt");
    assert_eq!(manifest.files[0].size, 1);
}
