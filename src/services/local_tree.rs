//! Walks over local directory trees.

use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// A regular file found below a walk root.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Absolute (or walk-root-joined) path on disk.
    pub path: PathBuf,

    /// Path relative to the walk root, `/`-separated.
    pub relative: String,

    pub size: u64,
}

/// Collect every regular file below `root`, depth first.
///
/// Symlinks are not followed. Returns `NotFound` when `root` is missing.
pub async fn walk_files(root: &Path) -> io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut pending: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, rel)) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel = if rel.is_empty() {
                name
            } else {
                format!("{rel}/{name}")
            };
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push((entry.path(), child_rel));
            } else if file_type.is_file() {
                let size = entry.metadata().await?.len();
                files.push(LocalFile {
                    path: entry.path(),
                    relative: child_rel,
                    size,
                });
            }
        }
    }

    Ok(files)
}

/// Sum of file sizes below `root`.
pub async fn tree_size(root: &Path) -> io::Result<u64> {
    Ok(walk_files(root).await?.iter().map(|f| f.size).sum())
}

/// Join a `/`-separated relative path onto `base`.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|p| !p.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}
