//! Storage backend abstraction for the frozen bucket archive.
//!
//! Every flow talks to the archive through [`StorageBackend`]. Paths are
//! logical, `/`-separated and relative to the archive root; each backend maps
//! them to its native address. A "directory" is a prefix in both backends: it
//! exists when at least one entry lives below it.
//!
//! ## Layout
//! - `<index>/`                          one container per index
//! - `<index>/<prefix>_<normalized>/...` one subtree per archived bucket
//! - `<index>/<normalized>.lock`         lock marker, payload = short hostname

pub mod filesystem;
pub mod object_storage;

use crate::config::BackendConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{io, path::Path, sync::Arc};
use thiserror::Error;

pub use filesystem::FilesystemBackend;
pub use object_storage::{ObjectStorageBackend, ObjectStorageConfig};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("failed to copy `{source_path}` to `{destination}`: {reason}")]
    CopyFailed {
        source_path: String,
        destination: String,
        reason: String,
    },
    #[error("`{0}` not found in archive")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
}

impl StorageError {
    pub(crate) fn copy_failed(
        source: impl std::fmt::Display,
        destination: impl std::fmt::Display,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::CopyFailed {
            source_path: source.to_string(),
            destination: destination.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Which implementation sits behind a [`StorageBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Filesystem,
    ObjectStorage,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Filesystem => "filesystem",
            BackendKind::ObjectStorage => "object-storage",
        }
    }
}

/// Capabilities the archive flows need from a storage service.
///
/// Implementations are bound to one archive root at construction time and
/// hold no business state.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Backend-native address of `path`, for logs and status records.
    fn describe(&self, path: &str) -> String;

    /// True when anything lives at or below `path`. Lookup failures read as
    /// absent.
    async fn exists(&self, path: &str) -> bool;

    /// Total bytes of every file or object below `path`.
    async fn size(&self, path: &str) -> StorageResult<u64>;

    /// Create an index container. Existing containers are left alone.
    async fn create_container(&self, name: &str) -> StorageResult<()>;

    /// Names of the index containers under the root, sorted.
    async fn list_containers(&self) -> StorageResult<Vec<String>>;

    /// Upload the tree rooted at `local_source` to `path`, file by file.
    /// Returns the number of bytes transferred.
    async fn copy_in(&self, local_source: &Path, path: &str) -> StorageResult<u64>;

    /// Bucket-like child names directly under `prefix`, deduplicated and sorted.
    /// A missing prefix lists as empty.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove `path` and everything under it. Missing paths are a no-op.
    async fn remove(&self, path: &str) -> StorageResult<()>;

    /// Rebuild the tree stored at `path` under `local_target`.
    /// Returns the number of bytes written.
    async fn restore_out(&self, path: &str, local_target: &Path) -> StorageResult<u64>;

    async fn lock_exists(&self, path: &str) -> bool;

    /// Create the lock marker. Returns `false` when it already exists.
    async fn write_lock(&self, path: &str, payload: &str) -> StorageResult<bool>;

    async fn read_lock(&self, path: &str) -> StorageResult<String>;

    /// Last-modified time of the lock marker.
    async fn lock_age(&self, path: &str) -> StorageResult<DateTime<Utc>>;

    /// Delete the lock marker. Missing markers are a no-op.
    async fn remove_lock(&self, path: &str) -> StorageResult<()>;
}

impl std::fmt::Debug for dyn StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind().as_str(), self.describe(""))
    }
}

/// Build and validate the backend selected in `config`.
///
/// Fails with [`StorageError::BackendUnavailable`] when the archive root is
/// missing or not writable.
pub async fn connect(config: &BackendConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        BackendConfig::Filesystem { root } => {
            Ok(Arc::new(FilesystemBackend::connect(root).await?))
        }
        BackendConfig::ObjectStorage(cfg) => {
            Ok(Arc::new(ObjectStorageBackend::connect(cfg).await?))
        }
    }
}

/// Join logical path segments with `/`, skipping empty ones.
pub fn join_path<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_skips_empty_segments() {
        assert_eq!(join_path(["main", "db_1_1_1_G"]), "main/db_1_1_1_G");
        assert_eq!(join_path(["", "/main/", "x"]), "main/x");
        assert_eq!(join_path([""]), "");
    }
}
