//! Codebase context passed to agents alongside the prompt.

use std::fs;
use std::path::Path;

use crate::agent::Context;
use crate::{qlog_debug, Result};

pub const DEFAULT_MAX_FILES: usize = 50;
const MAX_DEPTH: usize = 3;

/// Directories never listed, besides hidden ones.
const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "venv",
    "dist",
    "build",
    "target",
    "vendor",
];

/// (project type, marker files, source extensions). First match wins.
const PROJECT_MARKERS: &[(&str, &[&str], &[&str])] = &[
    ("Python", &["requirements.txt", "setup.py", "pyproject.toml"], &["py"]),
    ("JavaScript/Node", &["package.json"], &["js", "ts"]),
    ("Java", &["pom.xml", "build.gradle"], &["java"]),
    ("Go", &["go.mod"], &["go"]),
    ("Rust", &["Cargo.toml"], &["rs"]),
    ("Ruby", &["Gemfile"], &["rb"]),
];

/// Build `{root, project_type, files}` for the directory at `root`.
pub fn build_context(root: &Path, max_files: usize) -> Result<Context> {
    let mut files = Vec::new();
    collect_files(root, root, 0, max_files, &mut files)?;

    let mut context = Context::new();
    context.insert("root".to_string(), root.display().to_string());
    context.insert("project_type".to_string(), detect_project_type(root).to_string());
    context.insert("files".to_string(), files.join("\n"));
    qlog_debug!("build_context: {} file(s) under {}", files.len(), root.display());
    Ok(context)
}

pub fn detect_project_type(root: &Path) -> &'static str {
    let root_extensions: Vec<String> = fs::read_dir(root)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| {
                    e.path()
                        .extension()
                        .map(|ext| ext.to_string_lossy().into_owned())
                })
                .collect()
        })
        .unwrap_or_default();

    PROJECT_MARKERS
        .iter()
        .find(|(_, markers, extensions)| {
            markers.iter().any(|m| root.join(m).exists())
                || extensions
                    .iter()
                    .any(|ext| root_extensions.iter().any(|e| e == ext))
        })
        .map_or("Unknown", |(name, _, _)| *name)
}

fn collect_files(
    root: &Path,
    dir: &Path,
    depth: usize,
    max_files: usize,
    out: &mut Vec<String>,
) -> Result<()> {
    if depth >= MAX_DEPTH || out.len() >= max_files {
        return Ok(());
    }

    let mut entries: Vec<_> = fs::read_dir(dir)?.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if out.len() >= max_files {
            break;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            if IGNORED_DIRS.contains(&name.as_str()) {
                continue;
            }
            // Unreadable subdirectories are skipped.
            let _ = collect_files(root, &path, depth + 1, max_files, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}
