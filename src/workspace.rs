//! Preview and apply a chosen response against the working tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::Response;
use crate::backup::{BackupManager, RestoreReport};
use crate::diff::{ApplyReport, DiffEngine, FileDiff};
use crate::extract::{extract_operations, FileOperation};
use crate::util::{blocking, resolve_in_root};
use crate::{qlog, Result};

/// Result of [`Workspace::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChanges {
    /// Snapshot taken before writing, if any existing file was touched.
    pub backup_id: Option<String>,
    pub report: ApplyReport,
}

pub struct Workspace {
    diff: Arc<DiffEngine>,
    backups: Arc<BackupManager>,
    keep_backups: Option<usize>,
}

impl Workspace {
    pub fn new(working_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        let working_root = working_root.into();
        Self {
            diff: Arc::new(DiffEngine::new(working_root.clone())),
            backups: Arc::new(BackupManager::new(working_root, backup_root)),
            keep_backups: None,
        }
    }

    /// Prune to the `keep` newest snapshots after every backup. The snapshot
    /// just taken is always kept, so a retention of 0 behaves like 1.
    pub fn with_retention(mut self, keep: usize) -> Self {
        self.keep_backups = Some(keep);
        self
    }

    pub fn working_root(&self) -> &Path {
        self.diff.working_root()
    }

    pub fn diff_engine(&self) -> &DiffEngine {
        &self.diff
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn operations(&self, response: &Response) -> Vec<FileOperation> {
        last_per_path(extract_operations(&response.content), |op| &op.path)
    }

    /// Extract the response's file operations and diff them against disk.
    pub fn preview(&self, response: &Response) -> Vec<FileDiff> {
        self.diff.compute_diffs(&self.operations(response))
    }

    /// Snapshot every existing target, then write the diffs.
    ///
    /// Later diffs for the same path replace earlier ones. A dry run neither
    /// backs up nor writes. If the snapshot cannot be created nothing is
    /// written and the error is returned.
    pub async fn apply(&self, diffs: Vec<FileDiff>, dry_run: bool) -> Result<AppliedChanges> {
        let diffs = last_per_path(diffs, |d| &d.path);
        let diff = Arc::clone(&self.diff);

        if dry_run {
            return Ok(AppliedChanges {
                backup_id: None,
                report: diff.apply_changes(&diffs, true),
            });
        }

        let backups = Arc::clone(&self.backups);
        let keep = self.keep_backups;
        blocking(move || {
            let existing: Vec<PathBuf> = diffs
                .iter()
                .map(|d| PathBuf::from(&d.path))
                .filter(|p| {
                    resolve_in_root(backups.working_root(), p)
                        .map(|target| target.is_file())
                        .unwrap_or(false)
                })
                .collect();

            let backup_id = if existing.is_empty() {
                None
            } else {
                let id = backups.create_backup(&existing)?;
                if let Some(keep) = keep {
                    // Never drop the snapshot this apply is about to rely on.
                    backups.prune_backups(keep.max(1));
                }
                Some(id)
            };

            let report = diff.apply_changes(&diffs, false);
            qlog!(
                "Applied {} change(s), backup={:?}",
                report.success.len(),
                backup_id
            );
            Ok(AppliedChanges { backup_id, report })
        })
        .await
    }

    /// Restore every file of a snapshot.
    pub async fn rollback(&self, backup_id: &str) -> Result<RestoreReport> {
        self.restore(backup_id, Vec::new()).await
    }

    /// Restore a snapshot, limited to `paths` unless empty.
    pub async fn restore(&self, backup_id: &str, paths: Vec<PathBuf>) -> Result<RestoreReport> {
        let backups = Arc::clone(&self.backups);
        let id = backup_id.to_string();
        blocking(move || {
            let subset = (!paths.is_empty()).then_some(paths.as_slice());
            backups.restore_backup(&id, subset)
        })
        .await
    }
}

/// Keep only the last item for each path, in the order those last items appear.
fn last_per_path<T>(items: Vec<T>, path: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut kept: Vec<T> = items
        .into_iter()
        .rev()
        .filter(|item| seen.insert(path(item).to_string()))
        .collect();
    kept.reverse();
    kept
}
