//! Shared utility functions.

use std::path::{Component, Path, PathBuf};

use tokio::task::spawn_blocking;

use crate::{Error, Result};

/// Run filesystem-heavy work (apply, backup, restore) off the async workers.
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Resolve `path` against `root`, refusing anything that would land outside it.
///
/// Relative paths may not climb above the root with `..`. Absolute paths are
/// accepted only when they already point inside the root, and are then made
/// relative to it.
pub fn resolve_in_root(root: &Path, path: &Path) -> Result<PathBuf> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root)
            .map_err(|_| Error::PathOutsideRoot(path.to_path_buf()))?
            .to_path_buf()
    } else {
        path.to_path_buf()
    };

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(Error::PathOutsideRoot(path.to_path_buf()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathOutsideRoot(path.to_path_buf()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::Validation(format!(
            "empty file path: {}",
            path.display()
        )));
    }
    Ok(root.join(normalized))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Truncate to at most `max` characters without splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
