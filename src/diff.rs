//! Diff preview and apply for extracted file operations.
//!
//! `DiffEngine` reads the current state of each target under its working
//! root, renders a unified diff against the proposed content, and can write the
//! changes back. All paths go through [`resolve_in_root`], so nothing outside
//! the working root is ever read or written.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::extract::{FileOperation, FileOperationKind};
use crate::util::resolve_in_root;
use crate::{qlog, qlog_debug, qlog_warn, Result};

/// Lines of unchanged context around each hunk.
pub const CONTEXT_LINES: usize = 3;

/// Above this many LCS cells the changed region is shown as a full replacement.
const MAX_LCS_CELLS: usize = 4_000_000;

/// Line and character counts for one file.
///
/// `lines_added`/`lines_removed` are the net change in line count, not the
/// churn: replacing a line with another reports zero of each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub old_lines: usize,
    pub new_lines: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub chars_added: usize,
    pub chars_removed: usize,
}

impl DiffStats {
    pub fn between(old: Option<&str>, new: Option<&str>) -> Self {
        let old_lines = old.map_or(0, |s| s.lines().count());
        let new_lines = new.map_or(0, |s| s.lines().count());
        Self {
            old_lines,
            new_lines,
            lines_added: new_lines.saturating_sub(old_lines),
            lines_removed: old_lines.saturating_sub(new_lines),
            chars_added: new.map_or(0, |s| s.chars().count()),
            chars_removed: old.map_or(0, |s| s.chars().count()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub operation: FileOperationKind,
    pub path: String,
    pub language: Option<String>,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub unified_diff: String,
    pub stats: DiffStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of an apply batch. Every input diff lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub success: Vec<String>,
    pub failed: Vec<ApplyFailure>,
    pub skipped: Vec<String>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.success.len() + self.failed.len() + self.skipped.len()
    }
}

enum Applied {
    Written,
    Skipped,
}

pub struct DiffEngine {
    working_root: PathBuf,
}

impl DiffEngine {
    pub fn new(working_root: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
        }
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    /// One diff per operation, in input order.
    pub fn compute_diffs(&self, operations: &[FileOperation]) -> Vec<FileDiff> {
        operations.iter().map(|op| self.compute_diff(op)).collect()
    }

    pub fn compute_diff(&self, operation: &FileOperation) -> FileDiff {
        let old_content = match operation.kind {
            FileOperationKind::Modify | FileOperationKind::Delete => {
                self.read_current(&operation.path)
            }
            FileOperationKind::Create | FileOperationKind::Unknown => None,
        };
        let new_content = operation.content.clone();

        FileDiff {
            operation: operation.kind,
            path: operation.path.clone(),
            language: operation.language.clone(),
            unified_diff: unified_diff(
                &operation.path,
                old_content.as_deref(),
                new_content.as_deref(),
                operation.kind,
            ),
            stats: DiffStats::between(old_content.as_deref(), new_content.as_deref()),
            old_content,
            new_content,
        }
    }

    /// Missing, unreadable or out-of-root files read as absent.
    fn read_current(&self, path: &str) -> Option<String> {
        let target = resolve_in_root(&self.working_root, Path::new(path)).ok()?;
        match fs::read(&target) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                qlog_debug!("read_current: {} unreadable: {}", target.display(), e);
                None
            }
        }
    }

    /// Write the diffs to disk, one file at a time.
    ///
    /// A failure on one file is recorded and the batch continues. With
    /// `dry_run` nothing is touched; every diff whose path stays inside the
    /// root is reported as a success.
    pub fn apply_changes(&self, diffs: &[FileDiff], dry_run: bool) -> ApplyReport {
        let mut report = ApplyReport::default();

        for diff in diffs {
            let outcome = if dry_run {
                resolve_in_root(&self.working_root, Path::new(&diff.path)).map(|_| Applied::Written)
            } else {
                self.apply_one(diff)
            };

            match outcome {
                Ok(Applied::Written) => {
                    qlog_debug!("apply: {} {}", diff.operation, diff.path);
                    report.success.push(diff.path.clone());
                }
                Ok(Applied::Skipped) => {
                    qlog_debug!("apply: skipped {} (already absent)", diff.path);
                    report.skipped.push(diff.path.clone());
                }
                Err(e) => {
                    qlog_warn!("apply: {} failed: {}", diff.path, e);
                    report.failed.push(ApplyFailure {
                        path: diff.path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        qlog!(
            "apply{}: {} ok, {} failed, {} skipped",
            if dry_run { " (dry run)" } else { "" },
            report.success.len(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }

    fn apply_one(&self, diff: &FileDiff) -> Result<Applied> {
        let target = resolve_in_root(&self.working_root, Path::new(&diff.path))?;

        if diff.operation == FileOperationKind::Delete {
            return match fs::remove_file(&target) {
                Ok(()) => Ok(Applied::Written),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(Applied::Skipped),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, diff.new_content.as_deref().unwrap_or(""))?;
        Ok(Applied::Written)
    }
}

/// Render the diff text for one operation.
///
/// Create and Delete list every line as added or removed under a header that
/// names the file as new or deleted. Modify (and Unknown) produce a standard
/// unified diff, header-only when the bytes are identical. Lines are compared
/// with their terminators, so a dropped final newline or a CRLF to LF
/// conversion shows up as a change.
pub fn unified_diff(
    path: &str,
    old: Option<&str>,
    new: Option<&str>,
    kind: FileOperationKind,
) -> String {
    match kind {
        FileOperationKind::Create => {
            let mut out = format!("+++ {} (new file)\n", path);
            for line in new.unwrap_or("").lines() {
                out.push('+');
                out.push_str(line);
                out.push('\n');
            }
            out
        }
        FileOperationKind::Delete => {
            let mut out = format!("--- {} (deleted)\n", path);
            for line in old.unwrap_or("").lines() {
                out.push('-');
                out.push_str(line);
                out.push('\n');
            }
            out
        }
        FileOperationKind::Modify | FileOperationKind::Unknown => {
            let old_lines: Vec<&str> = old.unwrap_or("").split_inclusive('\n').collect();
            let new_lines: Vec<&str> = new.unwrap_or("").split_inclusive('\n').collect();
            let mut out = format!("--- a/{}\n+++ b/{}\n", path, path);
            for hunk in hunks(&edit_script(&old_lines, &new_lines), CONTEXT_LINES) {
                out.push_str(&hunk);
            }
            out
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit<'a> {
    Equal(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

impl Edit<'_> {
    fn is_change(&self) -> bool {
        !matches!(self, Edit::Equal(_))
    }
}

/// Line-level edit script between `old` and `new`.
fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut edits: Vec<Edit<'a>> = old[..prefix].iter().copied().map(Edit::Equal).collect();

    if old_mid.len().saturating_mul(new_mid.len()) > MAX_LCS_CELLS {
        edits.extend(old_mid.iter().copied().map(Edit::Delete));
        edits.extend(new_mid.iter().copied().map(Edit::Insert));
    } else {
        let (mut i, mut j) = (0, 0);
        for (ai, bj) in lcs_alignment(old_mid, new_mid) {
            edits.extend(old_mid[i..ai].iter().copied().map(Edit::Delete));
            edits.extend(new_mid[j..bj].iter().copied().map(Edit::Insert));
            edits.push(Edit::Equal(old_mid[ai]));
            i = ai + 1;
            j = bj + 1;
        }
        edits.extend(old_mid[i..].iter().copied().map(Edit::Delete));
        edits.extend(new_mid[j..].iter().copied().map(Edit::Insert));
    }

    edits.extend(old[old.len() - suffix..].iter().copied().map(Edit::Equal));
    edits
}

/// Matching (old_index, new_index) pairs of a longest common subsequence.
fn lcs_alignment(a: &[&str], b: &[&str]) -> Vec<(usize, usize)> {
    let m = a.len();
    let n = b.len();
    if m == 0 || n == 0 {
        return Vec::new();
    }

    // dp[i][j] = LCS length of a[..i] and b[..j]
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if a[i - 1] == b[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i][j - 1].max(dp[i - 1][j])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            pairs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if dp[i][j - 1] > dp[i - 1][j] {
            j -= 1;
        } else {
            i -= 1;
        }
    }
    pairs.reverse();
    pairs
}

/// Group the edit script into `@@` hunks with `context` lines around changes.
fn hunks(edits: &[Edit<'_>], context: usize) -> Vec<String> {
    // (old_pos, new_pos) before each edit, 0-based.
    let mut positions = Vec::with_capacity(edits.len());
    let (mut o, mut n) = (0usize, 0usize);
    for edit in edits {
        positions.push((o, n));
        match edit {
            Edit::Equal(_) => {
                o += 1;
                n += 1;
            }
            Edit::Delete(_) => o += 1,
            Edit::Insert(_) => n += 1,
        }
    }

    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_change())
        .map(|(i, _)| i)
        .collect();

    // Split into groups wherever two changes are separated by more than
    // twice the context.
    let mut groups: Vec<(usize, usize)> = Vec::new();
    for &idx in &changes {
        match groups.last_mut() {
            Some((_, last)) if idx - *last <= 2 * context + 1 => *last = idx,
            _ => groups.push((idx, idx)),
        }
    }

    groups
        .into_iter()
        .map(|(first, last)| {
            let start = first.saturating_sub(context);
            let end = (last + context + 1).min(edits.len());
            let slice = &edits[start..end];

            let (old_start, new_start) = positions[start];
            let old_count = slice.iter().filter(|e| !matches!(e, Edit::Insert(_))).count();
            let new_count = slice.iter().filter(|e| !matches!(e, Edit::Delete(_))).count();

            let mut out = format!(
                "@@ -{} +{} @@\n",
                hunk_range(old_start, old_count),
                hunk_range(new_start, new_count)
            );
            for edit in slice {
                let (sign, line) = match edit {
                    Edit::Equal(l) => (' ', l),
                    Edit::Delete(l) => ('-', l),
                    Edit::Insert(l) => ('+', l),
                };
                out.push(sign);
                match line.strip_suffix('\n') {
                    Some(body) => {
                        out.push_str(body);
                        out.push('\n');
                    }
                    None => {
                        out.push_str(line);
                        out.push_str("\n\\ No newline at end of file\n");
                    }
                }
            }
            out
        })
        .collect()
}

/// `start,count` in 1-based unified-diff form. An empty range names the line
/// before it; a single line omits the count.
fn hunk_range(start: usize, count: usize) -> String {
    match count {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, count),
    }
}
