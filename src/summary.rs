//! Plain-text reports printed by the CLI.

use std::fmt::Write;

use crate::backup::BackupInfo;
use crate::diff::FileDiff;
use crate::evaluate::EvaluationResult;
use crate::extract::FileOperation;
use crate::util::truncate_chars;

const RULE_WIDTH: usize = 60;
const MAX_LISTED_BACKUPS: usize = 10;
const PREVIEW_CHARS: usize = 60;
/// Diffs longer than this are shown as head + tail.
const MAX_DIFF_LINES: usize = 100;
const DIFF_HEAD_LINES: usize = 50;
const DIFF_TAIL_LINES: usize = 10;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Ranking with per-evaluator scores.
pub fn evaluation_summary(results: &[EvaluationResult]) -> String {
    if results.is_empty() {
        return "No evaluation results".to_string();
    }

    let mut out = format!("Evaluation Results\n{}\n", rule());
    for result in results {
        let response = &result.response;
        let _ = writeln!(
            out,
            "\n#{} {} - score {:.1}/100",
            result.rank, response.author.name, result.average_score
        );
        if let Some(reason) = &response.failure_reason {
            let _ = writeln!(out, "   FAILED: {}", reason);
        }
        if !result.scores.is_empty() {
            let scores = result
                .scores
                .iter()
                .map(|(evaluator, score)| format!("{}: {:.0}", evaluator, score))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "   Scores: {}", scores);
        }
        let _ = write!(out, "   Latency: {:.2}s", response.latency.as_secs_f64());
        if let Some(tokens) = response.tokens_used {
            let _ = write!(out, ", tokens: {}", tokens);
        }
        out.push('\n');
    }
    out.push_str(&rule());
    out
}

pub fn operations_summary(operations: &[FileOperation]) -> String {
    if operations.is_empty() {
        return "No file operations detected".to_string();
    }

    let mut out = format!("File Operations\n{}\n", rule());
    for op in operations {
        let _ = writeln!(out, "\n{}: {}", op.kind.as_str().to_uppercase(), op.path);
        if let Some(language) = &op.language {
            let _ = writeln!(out, "   Language: {}", language);
        }
        if let Some(content) = &op.content {
            let first = content.lines().next().unwrap_or("");
            let _ = writeln!(out, "   Lines: {}", content.lines().count());
            let _ = writeln!(out, "   Preview: {}...", truncate_chars(first, PREVIEW_CHARS));
        }
    }
    out.push_str(&rule());
    out
}

/// Per-file +/- counts and totals.
pub fn diff_summary(diffs: &[FileDiff]) -> String {
    if diffs.is_empty() {
        return "No changes detected".to_string();
    }

    let mut out = format!("Changes Summary\n{}\n", rule());
    let (mut added, mut removed) = (0, 0);
    for diff in diffs {
        added += diff.stats.lines_added;
        removed += diff.stats.lines_removed;
        let _ = writeln!(
            out,
            "\n{}: {}\n   Lines: +{} -{}",
            diff.operation.as_str().to_uppercase(),
            diff.path,
            diff.stats.lines_added,
            diff.stats.lines_removed
        );
    }
    let _ = write!(
        out,
        "\n{}\nTotal: {} file(s), +{} -{} lines",
        rule(),
        diffs.len(),
        added,
        removed
    );
    out
}

/// Full diff text for one file, shortened when very long.
pub fn diff_detail(diff: &FileDiff) -> String {
    let mut out = format!(
        "{}\nFile: {} ({})\nLines: +{} -{}\n{}\n",
        rule(),
        diff.path,
        diff.operation,
        diff.stats.lines_added,
        diff.stats.lines_removed,
        rule()
    );

    let lines: Vec<&str> = diff.unified_diff.lines().collect();
    if lines.len() > MAX_DIFF_LINES {
        for line in &lines[..DIFF_HEAD_LINES] {
            let _ = writeln!(out, "{}", line);
        }
        let _ = writeln!(
            out,
            "... ({} lines omitted) ...",
            lines.len() - DIFF_HEAD_LINES - DIFF_TAIL_LINES
        );
        for line in &lines[lines.len() - DIFF_TAIL_LINES..] {
            let _ = writeln!(out, "{}", line);
        }
    } else {
        out.push_str(&diff.unified_diff);
    }
    out
}

/// The newest backups, most recent first.
pub fn backup_list(backups: &[BackupInfo]) -> String {
    if backups.is_empty() {
        return "No backups found".to_string();
    }

    let mut out = format!("Available Backups\n{}\n", rule());
    for (i, backup) in backups.iter().take(MAX_LISTED_BACKUPS).enumerate() {
        let _ = writeln!(
            out,
            "\n{}. {}\n   Time: {}\n   Files: {}",
            i + 1,
            backup.id,
            backup.timestamp.format("%Y-%m-%d %H:%M:%S"),
            backup.file_count
        );
    }
    if backups.len() > MAX_LISTED_BACKUPS {
        let _ = write!(
            out,
            "\n... and {} more backup(s)",
            backups.len() - MAX_LISTED_BACKUPS
        );
    }
    out
}
