//! Snapshots of working-tree files taken before an apply.
//!
//! Layout under the backup root:
//!
//! ```text
//! <backup_root>/
//!   backup_20260114_093012_481/
//!     manifest.json
//!     files/
//!       src/app.py
//!       README.md
//! ```
//!
//! Snapshot ids sort by creation time. Stored files live under `files/` so a
//! backed-up path can never collide with the manifest.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::util::resolve_in_root;
use crate::{qlog, qlog_debug, qlog_warn, Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FILES_DIR: &str = "files";
/// Backup root used when none is configured, relative to the working root.
pub const DEFAULT_BACKUP_DIR: &str = ".quorum-backups";

const ID_PREFIX: &str = "backup_";
const ID_TIME_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the working root.
    pub original_path: String,
    /// Path relative to the snapshot directory.
    pub backup_path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub timestamp: DateTime<Local>,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub id: String,
    pub timestamp: DateTime<Local>,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub failed: Vec<RestoreFailure>,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BackupManager {
    working_root: PathBuf,
    backup_root: PathBuf,
}

impl BackupManager {
    pub fn new(working_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
            backup_root: backup_root.into(),
        }
    }

    /// Keep backups in `<working_root>/.quorum-backups`.
    pub fn in_working_root(working_root: impl Into<PathBuf>) -> Self {
        let working_root = working_root.into();
        let backup_root = working_root.join(DEFAULT_BACKUP_DIR);
        Self::new(working_root, backup_root)
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Snapshot every existing path and return the new backup id.
    ///
    /// Missing paths are skipped silently. Paths outside the working root and
    /// files that fail to copy are logged and left out of the manifest.
    pub fn create_backup<P: AsRef<Path>>(&self, paths: &[P]) -> Result<String> {
        self.create_backup_at(paths, Local::now())
    }

    pub(crate) fn create_backup_at<P: AsRef<Path>>(
        &self,
        paths: &[P],
        timestamp: DateTime<Local>,
    ) -> Result<String> {
        fs::create_dir_all(&self.backup_root)?;
        let id = self.unique_id(timestamp);
        let snapshot = self.backup_root.join(&id);
        fs::create_dir(&snapshot)?;

        let mut seen = BTreeSet::new();
        let mut files = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let source = match resolve_in_root(&self.working_root, path) {
                Ok(source) => source,
                Err(e) => {
                    qlog_warn!("backup {}: skipping {}: {}", id, path.display(), e);
                    continue;
                }
            };
            if !source.is_file() {
                qlog_debug!("backup {}: {} does not exist, skipped", id, path.display());
                continue;
            }
            let relative = match source.strip_prefix(&self.working_root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            if !seen.insert(relative.clone()) {
                continue;
            }

            let stored = Path::new(FILES_DIR).join(&relative);
            match copy_file(&source, &snapshot.join(&stored)) {
                Ok(size) => files.push(ManifestEntry {
                    original_path: path_string(&relative),
                    backup_path: path_string(&stored),
                    size,
                }),
                Err(e) => {
                    qlog_warn!("backup {}: failed to copy {}: {}", id, relative.display(), e);
                }
            }
        }

        let manifest = Manifest { timestamp, files };
        fs::write(
            snapshot.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        qlog!("Created backup {} ({} file(s))", id, manifest.files.len());
        Ok(id)
    }

    fn unique_id(&self, timestamp: DateTime<Local>) -> String {
        let base = format!("{}{}", ID_PREFIX, timestamp.format(ID_TIME_FORMAT));
        if !self.backup_root.join(&base).exists() {
            return base;
        }
        (2u32..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.backup_root.join(candidate).exists())
            .unwrap_or(base)
    }

    /// All readable snapshots, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let entries = match fs::read_dir(&self.backup_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match read_manifest(&dir) {
                Ok(manifest) => backups.push(BackupInfo {
                    id,
                    timestamp: manifest.timestamp,
                    file_count: manifest.files.len(),
                }),
                Err(e) => qlog_debug!("list_backups: ignoring {}: {}", dir.display(), e),
            }
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(backups)
    }

    pub fn latest_backup(&self) -> Option<String> {
        self.list_backups().ok()?.into_iter().next().map(|b| b.id)
    }

    pub fn manifest(&self, id: &str) -> Result<Manifest> {
        let snapshot = self.snapshot_dir(id)?;
        read_manifest(&snapshot).map_err(|e| match e {
            Error::Io(io) if io.kind() == ErrorKind::NotFound => {
                Error::ManifestMissing(id.to_string())
            }
            other => other,
        })
    }

    /// Copy a snapshot's files back over the working tree.
    ///
    /// With `subset`, only entries whose original path matches one of the
    /// given paths are restored.
    ///
    /// # Errors
    ///
    /// [`Error::BackupNotFound`] or [`Error::ManifestMissing`] when the
    /// snapshot cannot be read. Per-file failures go into the report.
    pub fn restore_backup<P: AsRef<Path>>(
        &self,
        id: &str,
        subset: Option<&[P]>,
    ) -> Result<RestoreReport> {
        let snapshot = self.snapshot_dir(id)?;
        let manifest = self.manifest(id)?;

        let wanted: Option<Vec<PathBuf>> = subset.map(|paths| {
            paths
                .iter()
                .filter_map(|p| resolve_in_root(&self.working_root, p.as_ref()).ok())
                .collect()
        });

        let mut report = RestoreReport::default();
        for entry in &manifest.files {
            let target = match resolve_in_root(&self.working_root, Path::new(&entry.original_path)) {
                Ok(target) => target,
                Err(e) => {
                    report.failed.push(RestoreFailure {
                        path: entry.original_path.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if let Some(wanted) = &wanted {
                if !wanted.contains(&target) {
                    continue;
                }
            }

            let outcome = resolve_in_root(&snapshot, Path::new(&entry.backup_path))
                .and_then(|source| copy_file(&source, &target));
            match outcome {
                Ok(_) => report.restored.push(entry.original_path.clone()),
                Err(e) => {
                    qlog_warn!("restore {}: {} failed: {}", id, entry.original_path, e);
                    report.failed.push(RestoreFailure {
                        path: entry.original_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        qlog!(
            "Restored backup {}: {} file(s), {} failure(s)",
            id,
            report.restored.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Delete all but the `keep` newest snapshots. Returns how many were removed.
    pub fn prune_backups(&self, keep: usize) -> usize {
        let backups = match self.list_backups() {
            Ok(backups) => backups,
            Err(e) => {
                qlog_warn!("prune_backups: cannot list backups: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for backup in backups.into_iter().skip(keep) {
            match fs::remove_dir_all(self.backup_root.join(&backup.id)) {
                Ok(()) => removed += 1,
                Err(e) => qlog_debug!("prune_backups: {} not removed: {}", backup.id, e),
            }
        }
        if removed > 0 {
            qlog!("Pruned {} old backup(s), kept {}", removed, keep);
        }
        removed
    }

    fn snapshot_dir(&self, id: &str) -> Result<PathBuf> {
        let mut components = Path::new(id).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        let dir = self.backup_root.join(id);
        if !single || !dir.is_dir() {
            return Err(Error::BackupNotFound(id.to_string()));
        }
        Ok(dir)
    }
}

fn read_manifest(snapshot: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(snapshot.join(MANIFEST_FILE))?;
    Ok(serde_json::from_str(&text)?)
}

/// Copy creating parent directories; returns the number of bytes copied.
fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::copy(from, to)?)
}

/// Manifest paths always use `/` separators.
fn path_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
