//! Error taxonomy shared by every archive flow.
//!
//! Validation and integrity failures are fatal and carry enough context
//! (paths, sizes, hostnames) to diagnose without re-running. Lock timeouts are
//! not errors; they surface as outcomes of the individual flows.

use crate::models::bucket::BucketNameError;
use crate::services::storage::StorageError;
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    BucketName(#[from] BucketNameError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("`{path}` is not a valid bucket: {reason}")]
    InvalidBucket { path: PathBuf, reason: String },

    #[error("index `{0}` does not exist in the archive")]
    IndexNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "size mismatch between `{source_path}` ({source_size} bytes) and `{destination}` ({destination_size} bytes)"
    )]
    SizeMismatch {
        source_path: String,
        source_size: u64,
        destination: String,
        destination_size: u64,
    },

    #[error("stale lock `{path}` held by `{holder}` for {}s, manual intervention required", age.as_secs())]
    StaleLock {
        path: String,
        holder: String,
        age: Duration,
    },

    #[error("operation interrupted while holding `{lock}`")]
    Interrupted { lock: String },

    #[error("{failed} of {total} bucket rebuilds failed")]
    RebuildFailed { failed: usize, total: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ArchiveError {
    pub fn invalid_bucket(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidBucket {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
