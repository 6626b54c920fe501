//! Filesystem storage backend.
//!
//! The archive root is a directory (typically a shared mount). Logical paths
//! map directly onto it: `<root>/<index>/<bucket>/...`.

use super::{BackendKind, StorageBackend, StorageError, StorageResult};
use crate::models::bucket::BucketName;
use crate::services::local_tree::{join_relative, walk_files};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Archive stored below a local or mounted directory.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Validate `root` and bind the backend to it.
    ///
    /// The root must already exist and accept a write/read/delete probe.
    pub async fn connect(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StorageError::BackendUnavailable(format!(
                    "archive root `{}` is not a directory",
                    root.display()
                )));
            }
            Err(err) => {
                return Err(StorageError::BackendUnavailable(format!(
                    "archive root `{}` does not exist: {err}",
                    root.display()
                )));
            }
        }

        let probe = root.join(format!(".frozen-archive-probe-{}", Uuid::new_v4()));
        let probe_result = async {
            fs::write(&probe, b"probe").await?;
            let bytes = fs::read(&probe).await?;
            fs::remove_file(&probe).await?;
            if bytes != b"probe" {
                return Err(io::Error::other("probe content mismatch"));
            }
            Ok::<_, io::Error>(())
        }
        .await;
        if let Err(err) = probe_result {
            let _ = fs::remove_file(&probe).await;
            return Err(StorageError::BackendUnavailable(format!(
                "cannot write to archive root `{}`: {err}",
                root.display()
            )));
        }

        debug!(root = %root.display(), "filesystem backend ready");
        Ok(Self { root })
    }

    /// Resolve a logical path below the root.
    ///
    /// Rejects parent-directory components so no path escapes the root.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        if path.split('/').any(|part| part == "..") {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(join_relative(&self.root, path))
    }

    async fn is_dir(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => fs::metadata(full).await.is_ok_and(|m| m.is_dir()),
            Err(_) => false,
        }
    }

    fn not_found(path: &str, err: io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    fn describe(&self, path: &str) -> String {
        join_relative(&self.root, path).display().to_string()
    }

    async fn exists(&self, path: &str) -> bool {
        self.is_dir(path).await
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let full = self.resolve(path)?;
        match walk_files(&full).await {
            Ok(files) => Ok(files.iter().map(|f| f.size).sum()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn create_container(&self, name: &str) -> StorageResult<()> {
        let full = self.resolve(name)?;
        if !self.is_dir(name).await {
            debug!(path = %full.display(), "creating index container");
        }
        fs::create_dir_all(&full).await?;
        Ok(())
    }

    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        let mut names = BTreeSet::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                names.insert(name);
            }
        }
        Ok(names.into_iter().collect())
    }

    async fn copy_in(&self, local_source: &Path, path: &str) -> StorageResult<u64> {
        let destination = self.resolve(path)?;
        let copy_failed = |e: io::Error| {
            StorageError::copy_failed(local_source.display(), destination.display(), e)
        };
        let files = walk_files(local_source).await.map_err(copy_failed)?;
        fs::create_dir_all(&destination).await.map_err(copy_failed)?;

        let mut copied = 0;
        for file in files {
            let target = join_relative(&destination, &file.relative);
            let result = async {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::copy(&file.path, &target).await
            }
            .await;
            match result {
                Ok(bytes) => {
                    debug!(
                        source = %file.path.display(),
                        target = %target.display(),
                        bytes,
                        "copied file"
                    );
                    copied += bytes;
                }
                Err(err) => {
                    return Err(StorageError::copy_failed(
                        file.path.display(),
                        target.display(),
                        err,
                    ));
                }
            }
        }
        Ok(copied)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let full = self.resolve(prefix)?;
        let mut entries = match fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        let mut names = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if BucketName::is_bucket_like(&name) {
                names.insert(name);
            }
        }
        Ok(names.into_iter().collect())
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        let meta = match fs::symlink_metadata(&full).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }
        debug!(path = %full.display(), "removed");
        Ok(())
    }

    async fn restore_out(&self, path: &str, local_target: &Path) -> StorageResult<u64> {
        let source = self.resolve(path)?;
        let files = walk_files(&source)
            .await
            .map_err(|e| Self::not_found(path, e))?;

        fs::create_dir_all(local_target).await.map_err(|e| {
            StorageError::copy_failed(source.display(), local_target.display(), e)
        })?;

        let mut restored = 0;
        for file in files {
            let target = join_relative(local_target, &file.relative);
            let result = async {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::copy(&file.path, &target).await
            }
            .await;
            restored += result.map_err(|e| {
                StorageError::copy_failed(file.path.display(), target.display(), e)
            })?;
        }
        Ok(restored)
    }

    async fn lock_exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => fs::metadata(full).await.is_ok_and(|m| m.is_file()),
            Err(_) => false,
        }
    }

    async fn write_lock(&self, path: &str, payload: &str) -> StorageResult<bool> {
        let full = self.resolve(path)?;
        let parent = full.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("lock path missing parent directory"))
        })?;

        // Write the payload aside, then hard-link it into place: the link fails
        // if the marker exists, so the marker never appears without its payload.
        let tmp_path = parent.join(format!(".tmp-lock-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&tmp_path).await?;
        let written = async {
            file.write_all(payload.as_bytes()).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let linked = fs::hard_link(&tmp_path, &full).await;
        let _ = fs::remove_file(&tmp_path).await;
        match linked {
            Ok(()) => {
                debug!(path = %full.display(), "created lock marker");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn read_lock(&self, path: &str) -> StorageResult<String> {
        let full = self.resolve(path)?;
        let contents = fs::read_to_string(&full)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        Ok(contents.trim_end().to_string())
    }

    async fn lock_age(&self, path: &str) -> StorageResult<DateTime<Utc>> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        Ok(DateTime::<Utc>::from(meta.modified()?))
    }

    async fn remove_lock(&self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                debug!(path = %full.display(), "removed lock marker");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}
