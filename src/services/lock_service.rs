//! Advisory distributed lock built on the storage backend's lock primitives.
//!
//! A lock is a marker object whose payload is the short hostname of the peer
//! holding it. Acquisition polls until the marker is absent and then creates it
//! with a create-only write, so two peers racing for the same marker cannot
//! both succeed. Locks older than the staleness threshold are never taken
//! over; they abort the run and need an operator.

use crate::errors::{ArchiveError, ArchiveResult};
use crate::services::storage::{StorageBackend, StorageError};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, warn};

/// Default time spent waiting for a contended lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between acquisition attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Age after which a held lock is assumed to belong to a crashed peer.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub stale_after: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Result of a bounded acquisition attempt.
#[derive(Debug)]
pub enum LockOutcome {
    Acquired(LockGuard),
    /// Another peer kept the lock for the whole timeout.
    NotAcquired { holder: String, age: Duration },
}

/// Named lock bound to one storage backend.
#[derive(Clone)]
pub struct DistributedLock {
    storage: Arc<dyn StorageBackend>,
    path: String,
    holder: String,
    settings: LockSettings,
}

impl DistributedLock {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        path: impl Into<String>,
        holder: impl Into<String>,
        settings: LockSettings,
    ) -> Self {
        Self {
            storage,
            path: path.into(),
            holder: holder.into(),
            settings,
        }
    }

    /// Try to take the lock until the configured timeout elapses.
    ///
    /// Returns [`ArchiveError::StaleLock`] when the lock is still held at the
    /// timeout and is older than the staleness threshold.
    pub async fn acquire(&self) -> ArchiveResult<LockOutcome> {
        let deadline = Instant::now() + self.settings.timeout;

        loop {
            if !self.storage.lock_exists(&self.path).await
                && self.storage.write_lock(&self.path, &self.holder).await?
            {
                debug!(
                    lock = %self.storage.describe(&self.path),
                    holder = %self.holder,
                    "lock acquired"
                );
                return Ok(LockOutcome::Acquired(LockGuard {
                    storage: self.storage.clone(),
                    path: self.path.clone(),
                    released: false,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            debug!(lock = %self.path, "lock busy, retrying");
            sleep(self.settings.poll_interval.min(deadline - now)).await;
        }

        let (holder, age) = self.inspect().await?;
        if age > self.settings.stale_after {
            error!(
                lock = %self.storage.describe(&self.path),
                holder = %holder,
                age_secs = age.as_secs(),
                "stale lock found"
            );
            return Err(ArchiveError::StaleLock {
                path: self.storage.describe(&self.path),
                holder,
                age,
            });
        }

        warn!(
            lock = %self.storage.describe(&self.path),
            holder = %holder,
            age_secs = age.as_secs(),
            "timed out waiting for lock"
        );
        Ok(LockOutcome::NotAcquired { holder, age })
    }

    /// Current holder and age of the marker. A marker that vanished after the
    /// last attempt reads as unheld and fresh.
    async fn inspect(&self) -> ArchiveResult<(String, Duration)> {
        let holder = match self.storage.read_lock(&self.path).await {
            Ok(holder) => holder,
            Err(StorageError::NotFound(_)) => return Ok((String::new(), Duration::ZERO)),
            Err(err) => return Err(err.into()),
        };
        let modified = match self.storage.lock_age(&self.path).await {
            Ok(modified) => modified,
            Err(StorageError::NotFound(_)) => return Ok((holder, Duration::ZERO)),
            Err(err) => return Err(err.into()),
        };
        let age = Utc::now()
            .signed_duration_since(modified)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Ok((holder, age))
    }
}

/// Held lock. Call [`LockGuard::release`] on every exit path; dropping an
/// unreleased guard spawns a best-effort removal.
#[derive(Debug)]
pub struct LockGuard {
    storage: Arc<dyn StorageBackend>,
    path: String,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Delete the lock marker.
    pub async fn release(mut self) -> ArchiveResult<()> {
        self.released = true;
        self.storage.remove_lock(&self.path).await?;
        debug!(lock = %self.storage.describe(&self.path), "lock released");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(lock = %self.path, "lock guard dropped outside runtime, marker left behind");
            return;
        };

        warn!(lock = %self.path, "lock guard dropped without release, removing marker");
        let storage = self.storage.clone();
        let path = std::mem::take(&mut self.path);
        handle.spawn(async move {
            if let Err(err) = storage.remove_lock(&path).await {
                error!(lock = %path, error = %err, "failed to remove abandoned lock");
            }
        });
    }
}
