//! End-to-end tests: prompt to ranked answers to files on disk and back.

use quorum::coder::{Coder, QueryOptions};
use quorum::context::build_context;
use quorum::extract::FileOperationKind;
use quorum::summary;

use crate::fixtures::{roster, solution, ScriptedAgent, TestTree};

const ALPHA_REPLY: &str = "Update the version constant.\n\n\
File: app.py\n```python\nVERSION = 2\n```\n\n\
Create a helper module.\n\n\
File: util.py\n```python\ndef helper():\n    return 42\n```\n";

fn skip_enhancement() -> QueryOptions {
    QueryOptions {
        skip_enhancement: true,
        ..Default::default()
    }
}

/// Three agents that agree alpha's answer is best.
fn panel() -> Coder {
    let alpha = ScriptedAgent::new("alpha", ALPHA_REPLY)
        .scoring("beta", 40.0)
        .scoring("gamma", 30.0)
        .shared();
    let beta = ScriptedAgent::new("beta", &solution("app.py", "python", "VERSION = 3"))
        .scoring("alpha", 95.0)
        .scoring("gamma", 35.0)
        .shared();
    let gamma = ScriptedAgent::new("gamma", "I am not sure how to do that.")
        .scoring("alpha", 85.0)
        .scoring("beta", 60.0)
        .shared();
    Coder::new(roster(&[alpha, beta, gamma]))
}

/// Test: full pipeline
/// Given a project with app.py and a panel of 3 agents
/// When querying, applying the best answer and rolling back
/// Then the winner's edits land on disk, are backed up, and are undone
#[tokio::test]
async fn test_query_apply_rollback() {
    let tree = TestTree::new();
    tree.write("app.py", "VERSION = 1\n");
    let ws = tree.workspace();

    let result = panel()
        .query("bump the version and add a helper", skip_enhancement())
        .await
        .unwrap();

    assert_eq!(result.results.len(), 3);
    let best = result.best().unwrap();
    assert_eq!(best.response.author.name, "alpha");
    assert_eq!(best.average_score, 90.0);
    assert_eq!(result.by_rank(2).unwrap().response.author.name, "beta");
    assert_eq!(result.by_rank(3).unwrap().response.author.name, "gamma");
    assert!(summary::evaluation_summary(&result.results).contains("#1 alpha - score 90.0/100"));

    let diffs = ws.preview(&best.response);
    assert_eq!(diffs.len(), 2);
    assert_eq!(diffs[0].path, "app.py");
    assert_eq!(diffs[0].operation, FileOperationKind::Modify);
    assert_eq!(diffs[0].old_content.as_deref(), Some("VERSION = 1\n"));
    assert!(diffs[0].unified_diff.contains("-VERSION = 1\n+VERSION = 2\n"));
    assert_eq!(diffs[1].path, "util.py");
    assert_eq!(diffs[1].operation, FileOperationKind::Create);

    let applied = ws.apply(diffs, false).await.unwrap();
    assert!(applied.report.is_clean());
    assert_eq!(applied.report.success, vec!["app.py", "util.py"]);
    assert_eq!(tree.read("app.py").as_deref(), Some("VERSION = 2"));
    assert_eq!(
        tree.read("util.py").as_deref(),
        Some("def helper():\n    return 42")
    );

    let backup_id = applied.backup_id.expect("app.py existed and must be backed up");
    let manifest = ws.backups().manifest(&backup_id).unwrap();
    assert_eq!(manifest.files.len(), 1);
    assert_eq!(manifest.files[0].original_path, "app.py");

    let restored = ws.rollback(&backup_id).await.unwrap();
    assert!(restored.is_success());
    assert_eq!(tree.read("app.py").as_deref(), Some("VERSION = 1\n"));
    // Restore only brings back what was snapshotted; new files stay.
    assert!(tree.exists("util.py"));
}

/// Test: dry run
/// Given the same panel
/// When applying the best answer as a dry run
/// Then the report lists the files but nothing is written or backed up
#[tokio::test]
async fn test_dry_run_leaves_tree_untouched() {
    let tree = TestTree::new();
    tree.write("app.py", "VERSION = 1\n");
    let ws = tree.workspace();

    let result = panel().query("bump", skip_enhancement()).await.unwrap();
    let diffs = ws.preview(&result.best().unwrap().response);

    let applied = ws.apply(diffs, true).await.unwrap();
    assert!(applied.backup_id.is_none());
    assert_eq!(applied.report.success.len(), 2);
    assert_eq!(tree.read("app.py").as_deref(), Some("VERSION = 1\n"));
    assert!(!tree.exists("util.py"));
    assert!(ws.backups().list_backups().unwrap().is_empty());
}

/// Test: deletion round trip
#[tokio::test]
async fn test_delete_is_backed_up_and_restorable() {
    let tree = TestTree::new();
    tree.write("legacy/old.py", "print('old')\n");
    let ws = tree.workspace();

    let agent = ScriptedAgent::new(
        "solo",
        "Delete the obsolete module.\n\nFile: legacy/old.py\n```python\n# removed\n```",
    )
    .shared();
    let result = Coder::new(roster(&[agent]))
        .query("clean up", skip_enhancement())
        .await
        .unwrap();
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].average_score, 85.0);

    let diffs = ws.preview(&result.results[0].response);
    assert_eq!(diffs[0].operation, FileOperationKind::Delete);
    assert!(diffs[0].unified_diff.starts_with("--- legacy/old.py (deleted)\n"));

    let applied = ws.apply(diffs, false).await.unwrap();
    assert_eq!(applied.report.success, vec!["legacy/old.py"]);
    assert!(!tree.exists("legacy/old.py"));

    ws.rollback(applied.backup_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(tree.read("legacy/old.py").as_deref(), Some("print('old')\n"));
}

/// Test: escaping paths
/// Given an answer that targets a file outside the working tree
/// When applying
/// Then that file is reported as failed and never written
#[tokio::test]
async fn test_paths_outside_root_are_refused() {
    let tree = TestTree::new();
    let ws = tree.workspace();

    let agent = ScriptedAgent::new(
        "rogue",
        "File: ../escape.py\n```python\nboom = True\n```\n\nFile: inside.py\n```python\nok = True\n```",
    )
    .shared();
    let result = Coder::new(roster(&[agent]))
        .query("p", skip_enhancement())
        .await
        .unwrap();

    let diffs = ws.preview(&result.results[0].response);
    let applied = ws.apply(diffs, false).await.unwrap();

    assert_eq!(applied.report.success, vec!["inside.py"]);
    assert_eq!(applied.report.failed.len(), 1);
    assert_eq!(applied.report.failed[0].path, "../escape.py");
    assert!(!tree.temp_dir.path().join("escape.py").exists());
    assert_eq!(tree.read("inside.py").as_deref(), Some("ok = True"));
}

/// Test: clarifying questions and project context
#[tokio::test]
async fn test_enhanced_query_with_context() {
    let tree = TestTree::new();
    tree.write("Cargo.toml", "[package]\nname = \"demo\"\n");
    tree.write("src/main.rs", "fn main() {}\n");

    let agent = ScriptedAgent::new("asker", "fine")
        .with_questions(&["Which crate?", "Async or sync?"])
        .shared();
    let coder = Coder::new(roster(&[agent]));

    let context = build_context(&tree.root, 10).unwrap();
    assert_eq!(context["project_type"], "Rust");
    assert!(context["files"].lines().any(|f| f == "src/main.rs"));

    let result = coder
        .query(
            "add logging",
            QueryOptions {
                context: Some(context),
                answers: vec!["log".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.questions, vec!["Which crate?", "Async or sync?"]);
    assert!(result
        .enhanced_prompt
        .contains("1. Q: Which crate?\n   A: log\n2. Q: Async or sync?\n   A: (not specified)\n"));
    assert_eq!(result.responses[0].content, "fine");
    assert_eq!(result.original_prompt, "add logging");
}
