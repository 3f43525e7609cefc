//! Local file discovery and object key derivation.
//!
//! Walks the deploy directory and produces the candidate file list for a
//! sync, excluding ignored entries (VCS metadata, OS droppings). Directories
//! are never emitted; an ignored directory is pruned wholesale, so nothing
//! under `.git/` ever reaches the bucket.
//!
//! Visit order is filesystem-determined and carries no meaning — the sync
//! engine treats the result as a set.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Ignore suffixes applied when the config doesn't override them.
pub const DEFAULT_IGNORES: &[&str] = &[".DS_Store", ".git"];

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Enumerate every regular file under `root`, skipping entries whose path
/// ends with any of the ignore suffixes. A traversal error (e.g. permission
/// denied) aborts the walk — a partial file list would make the prune stage
/// delete objects that are still present locally.
pub fn walk_files(root: &Path, ignores: &[String]) -> Result<Vec<PathBuf>, WalkError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.path() == root || !is_ignored(entry.path(), ignores));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_ignored(path: &Path, ignores: &[String]) -> bool {
    let path = path.to_string_lossy();
    ignores.iter().any(|suffix| path.ends_with(suffix.as_str()))
}

/// Derive the object key for `path` relative to `root`.
///
/// Both paths are reduced to their normal components before the prefix is
/// stripped, so spellings like `./out`, `out/` and `out` all produce the
/// same key. The result always starts with `/`.
pub fn object_key(root: &Path, path: &Path) -> String {
    let root_parts = normal_components(root);
    let path_parts = normal_components(path);
    let rel = if path_parts.len() > root_parts.len() && path_parts.starts_with(&root_parts) {
        &path_parts[root_parts.len()..]
    } else {
        &path_parts[..]
    };
    let mut key = String::new();
    for part in rel {
        key.push('/');
        key.push_str(&part.to_string_lossy());
    }
    key
}

fn normal_components(path: &Path) -> Vec<&std::ffi::OsStr> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
