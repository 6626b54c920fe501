//! Archive orchestrator.
//!
//! Composes bucket identity, the storage backend and the distributed lock into
//! the four operational flows: archive one bucket, restore a time range, prune
//! by age and aggregate per-index statistics. Every mutation of an archived
//! bucket happens while holding that bucket's lock, and the lock is released
//! on success, on error and on interruption.

use crate::errors::{ArchiveError, ArchiveResult};
use crate::models::{
    bucket::{BucketName, BucketPrefix, GuidSource},
    collection::BucketCollection,
    peer::PeerIdentity,
    status::StatusRecord,
    time_range::TimeRange,
};
use crate::services::{
    local_tree::tree_size,
    lock_service::{DistributedLock, LockGuard, LockOutcome, LockSettings},
    status_sink::StatusSink,
    storage::{StorageBackend, join_path},
};
use chrono::{DateTime, Utc};
use flate2::{Compression, write::GzEncoder};
use futures::FutureExt;
use serde::Serialize;
use std::{
    collections::BTreeSet,
    future::Future,
    io::{self, Write},
    panic::{self, AssertUnwindSafe},
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RAWDATA_DIR: &str = "rawdata";
const RAW_SIZE_FILE: &str = ".rawSize";
const JOURNAL_PREFIX: &str = "journal.";
const JOURNALS: [&str; 2] = ["journal.zst", "journal.gz"];
const LEGACY_INDEX_SUFFIXES: [&str; 2] = [".tsidx", ".data"];

/// Everything a flow needs, built once per process.
#[derive(Clone)]
pub struct ArchiveContext {
    pub storage: Arc<dyn StorageBackend>,
    pub peer: PeerIdentity,
    pub sink: Arc<dyn StatusSink>,
    pub locks: LockSettings,
    /// Cancelled on SIGINT/SIGTERM; flows abort their critical section and
    /// release the held lock.
    pub shutdown: CancellationToken,
}

impl ArchiveContext {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        peer: PeerIdentity,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            storage,
            peer,
            sink,
            locks: LockSettings::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_lock_settings(mut self, locks: LockSettings) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Keep search files even for journal-based buckets (e.g. metric buckets
    /// with a stubbed-out journal).
    pub preserve_search_files: bool,

    /// Index name to use instead of the one derived from the bucket path.
    pub index: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived { destination: String, bytes: u64 },
    /// An identical copy (either prefix) was already in the archive.
    Existed { destination: String },
    /// Another peer held the bucket lock for the whole timeout.
    LockTimeout { holder: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: Vec<String>,
    pub existed: Vec<String>,
    pub lock_timeouts: Vec<String>,
    pub bytes: u64,
}

/// A bucket selected by the retention filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneCandidate {
    pub index: String,
    pub bucket: BucketName,
    pub location: String,
    pub size: u64,
    pub removed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub candidates: Vec<PruneCandidate>,
    pub lock_timeouts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub index: String,
    pub location: String,
    pub size_bytes: u64,
    pub bucket_count: usize,
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
}

/// What stripping did to a bucket before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripMode {
    /// Journal-based bucket: everything except the journal was deleted.
    Journal,
    /// Journal-based bucket kept intact on request.
    Preserved,
    /// Pre-journal bucket: index files were gzipped in place.
    Legacy,
}

pub struct ArchiveService {
    ctx: ArchiveContext,
}

impl ArchiveService {
    pub fn new(ctx: ArchiveContext) -> Self {
        Self { ctx }
    }

    /// Archive one local bucket directory.
    ///
    /// The local bucket is stripped in place before upload. A bucket already
    /// present under either prefix with the same size is reported as
    /// [`ArchiveOutcome::Existed`]; a size difference is fatal and leaves the
    /// archived copy untouched.
    pub async fn archive(
        &self,
        bucket_dir: &Path,
        options: ArchiveOptions,
    ) -> ArchiveResult<ArchiveOutcome> {
        let bucket_dir = strip_trailing_separator(bucket_dir);
        match fs::metadata(&bucket_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ArchiveError::invalid_bucket(&bucket_dir, "not a directory")),
            Err(err) => return Err(ArchiveError::invalid_bucket(&bucket_dir, err.to_string())),
        }
        if !is_dir(&bucket_dir.join(RAWDATA_DIR)).await {
            return Err(ArchiveError::invalid_bucket(
                &bucket_dir,
                "no rawdata directory",
            ));
        }

        let raw_name = bucket_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ArchiveError::invalid_bucket(&bucket_dir, "unreadable directory name"))?
            .to_string();
        let index = match options.index {
            Some(index) => index,
            None => derive_index_name(&bucket_dir).ok_or_else(|| {
                ArchiveError::invalid_bucket(&bucket_dir, "cannot derive index name from path")
            })?,
        };

        let mut record = StatusRecord::new();
        record
            .add("status", "none")
            .add("bucket", bucket_dir.display())
            .add("indexname", &index)
            .add("bucketname", &raw_name);

        let bucket = BucketName::parse(&raw_name, self.ctx.peer.guid())?;
        match BucketName::guid_source(&raw_name) {
            GuidSource::Name => {
                debug!(bucket = %raw_name, "replicated bucket, peer guid taken from name")
            }
            GuidSource::LocalPeer => {
                debug!(bucket = %raw_name, "local bucket, peer guid taken from instance.cfg")
            }
        }
        let destination = join_path([index.as_str(), bucket.dir_name().as_str()]);
        record
            .add("bucketend", bucket.end)
            .add("bucketstart", bucket.start)
            .add("bucketprefix", bucket.prefix)
            .add("peerguid", &bucket.peer_guid)
            .add("bucketid", bucket.id)
            .add("searchfiles", options.preserve_search_files)
            .add("bucketname_norm", bucket.normalized_name())
            .add("destdir", self.ctx.storage.describe(&destination));
        debug!(bucket = %raw_name, index = %index, destination = %destination, "archiving bucket");

        self.ctx.storage.create_container(&index).await?;

        let lock_path = join_path([index.as_str(), bucket.lock_name().as_str()]);
        self.ensure_running(&lock_path)?;
        let guard = match self.lock(&lock_path).acquire().await? {
            LockOutcome::Acquired(guard) => guard,
            LockOutcome::NotAcquired { holder, .. } => {
                record.add("status", "lock_timeout").add("lockholder", &holder);
                self.ctx.sink.emit(&record);
                return Ok(ArchiveOutcome::LockTimeout { holder });
            }
        };

        let outcome = self
            .locked(
                guard,
                self.archive_locked(
                    &bucket_dir,
                    &index,
                    &bucket,
                    &destination,
                    options.preserve_search_files,
                    &mut record,
                ),
            )
            .await?;
        self.ctx.sink.emit(&record);
        Ok(outcome)
    }

    async fn archive_locked(
        &self,
        bucket_dir: &Path,
        index: &str,
        bucket: &BucketName,
        destination: &str,
        preserve_search_files: bool,
        record: &mut StatusRecord,
    ) -> ArchiveResult<ArchiveOutcome> {
        if let Some(raw_size) = read_raw_size(bucket_dir).await {
            record.add("bucketsize_raw_b", raw_size);
        }
        record.add("bucketsize_full_b", tree_size(bucket_dir).await?);

        let strip_started = Instant::now();
        let mode = strip_bucket(bucket_dir, preserve_search_files).await?;
        record.add("striptime_ms", elapsed_ms(strip_started));
        debug!(bucket = %bucket_dir.display(), mode = ?mode, "bucket stripped");

        let stripped_size = tree_size(bucket_dir).await?;
        record.add("bucketsize_b", stripped_size).add("copytime_ms", 0);

        if let Some(existing) = self.find_archived(index, bucket).await {
            let existing_size = self.ctx.storage.size(&existing).await?;
            let existing_location = self.ctx.storage.describe(&existing);
            if existing_size != stripped_size {
                error!(
                    bucket = %bucket_dir.display(),
                    size = stripped_size,
                    target = %existing_location,
                    target_size = existing_size,
                    "bucket exists but sizes differ"
                );
                return Err(ArchiveError::SizeMismatch {
                    source_path: bucket_dir.display().to_string(),
                    source_size: stripped_size,
                    destination: existing_location,
                    destination_size: existing_size,
                });
            }
            info!(target = %existing_location, "bucket already archived");
            record.add("status", "existed");
            return Ok(ArchiveOutcome::Existed {
                destination: existing,
            });
        }

        let copy_started = Instant::now();
        let copied = self.ctx.storage.copy_in(bucket_dir, destination).await?;
        let archived_size = self.ctx.storage.size(destination).await?;
        if archived_size != stripped_size {
            return Err(ArchiveError::SizeMismatch {
                source_path: bucket_dir.display().to_string(),
                source_size: stripped_size,
                destination: self.ctx.storage.describe(destination),
                destination_size: archived_size,
            });
        }
        record
            .add("status", "archived")
            .add("copytime_ms", elapsed_ms(copy_started));
        Ok(ArchiveOutcome::Archived {
            destination: destination.to_string(),
            bytes: copied,
        })
    }

    /// Archived path of `bucket` under either prefix, `db_` first.
    async fn find_archived(&self, index: &str, bucket: &BucketName) -> Option<String> {
        for prefix in BucketPrefix::ALL {
            let candidate = join_path([index, bucket.with_prefix(prefix).dir_name().as_str()]);
            if self.ctx.storage.exists(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// Restore every bucket of `index` overlapping `range` into `target_dir`.
    pub async fn restore(
        &self,
        index: &str,
        range: TimeRange,
        target_dir: &Path,
    ) -> ArchiveResult<RestoreSummary> {
        match fs::metadata(target_dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(ArchiveError::InvalidArgument(format!(
                    "restore target `{}` is not a directory",
                    target_dir.display()
                )));
            }
        }
        if !self.ctx.storage.exists(index).await {
            return Err(ArchiveError::IndexNotFound(index.to_string()));
        }

        let selected = self
            .load_collection(index)
            .await?
            .filter_by_range(range.start, range.end);
        info!(
            index = %index,
            start = range.start,
            end = range.end,
            buckets = selected.len(),
            "restoring buckets"
        );

        let mut summary = RestoreSummary::default();
        for bucket in selected.iter() {
            let dir_name = bucket.dir_name();
            let remote = join_path([index, dir_name.as_str()]);
            let local = target_dir.join(&dir_name);

            let mut record = StatusRecord::new();
            record
                .add("status", "none")
                .add("indexname", index)
                .add("bucketname", &dir_name)
                .add("bucketstart", bucket.start)
                .add("bucketend", bucket.end)
                .add("source", self.ctx.storage.describe(&remote))
                .add("destdir", local.display());

            let lock_path = join_path([index, bucket.lock_name().as_str()]);
            self.ensure_running(&lock_path)?;
            let guard = match self.lock(&lock_path).acquire().await? {
                LockOutcome::Acquired(guard) => guard,
                LockOutcome::NotAcquired { holder, .. } => {
                    record.add("status", "lock_timeout").add("lockholder", holder);
                    self.ctx.sink.emit(&record);
                    summary.lock_timeouts.push(dir_name);
                    continue;
                }
            };

            let restored = self
                .locked(guard, self.restore_locked(&remote, &local, &mut record))
                .await?;
            self.ctx.sink.emit(&record);
            match restored {
                Some(bytes) => {
                    summary.bytes += bytes;
                    summary.restored.push(dir_name);
                }
                None => summary.existed.push(dir_name),
            }
        }
        Ok(summary)
    }

    /// `Some(bytes)` when restored, `None` when an identical copy was already
    /// present locally.
    async fn restore_locked(
        &self,
        remote: &str,
        local: &Path,
        record: &mut StatusRecord,
    ) -> ArchiveResult<Option<u64>> {
        let remote_size = self.ctx.storage.size(remote).await?;
        record.add("bucketsize_b", remote_size);

        if is_dir(local).await {
            let local_size = tree_size(local).await?;
            if local_size == remote_size {
                debug!(target = %local.display(), "bucket already restored");
                record.add("status", "existed");
                return Ok(None);
            }
            warn!(
                target = %local.display(),
                local_size,
                remote_size,
                "partial restore found, restoring again"
            );
        }

        let started = Instant::now();
        let written = self.ctx.storage.restore_out(remote, local).await?;
        let restored_size = tree_size(local).await?;
        if restored_size != remote_size {
            return Err(ArchiveError::SizeMismatch {
                source_path: self.ctx.storage.describe(remote),
                source_size: remote_size,
                destination: local.display().to_string(),
                destination_size: restored_size,
            });
        }
        record
            .add("status", "restored")
            .add("restoretime_ms", elapsed_ms(started));
        Ok(Some(written))
    }

    /// Remove archived buckets whose end is at least `days` days before `now`.
    ///
    /// With `dry_run` only reads are issued and no lock is taken.
    pub async fn prune(
        &self,
        indexes: &[String],
        days: u32,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> ArchiveResult<PruneSummary> {
        // Every listing is parsed before the first removal.
        let mut selections = Vec::new();
        for index in self.select_indexes(indexes).await? {
            let selected = self
                .load_collection(&index)
                .await?
                .filter_older_than(now, days);
            debug!(
                index = %selected.index(),
                days,
                buckets = selected.len(),
                "buckets past retention"
            );
            selections.push((index, selected));
        }

        let mut summary = PruneSummary::default();
        for (index, selected) in selections {
            for bucket in selected {
                let remote = join_path([index.as_str(), bucket.dir_name().as_str()]);
                let location = self.ctx.storage.describe(&remote);
                let size = self.ctx.storage.size(&remote).await?;

                let mut record = StatusRecord::new();
                record
                    .add("status", "none")
                    .add("bucketname", bucket.dir_name())
                    .add("indexname", &index)
                    .add("bucketend", bucket.end)
                    .add("bucketstart", bucket.start)
                    .add("bucketprefix", bucket.prefix)
                    .add("peerguid", &bucket.peer_guid)
                    .add("bucketid", bucket.id)
                    .add("bucketname_norm", bucket.normalized_name())
                    .add("destdir", &location)
                    .add("bucketsize_b", size);

                let mut candidate = PruneCandidate {
                    index: index.clone(),
                    bucket,
                    location,
                    size,
                    removed: false,
                };

                if dry_run {
                    record.add("status", "dryrun");
                    self.ctx.sink.emit(&record);
                    summary.candidates.push(candidate);
                    continue;
                }

                let lock_path = join_path([index.as_str(), candidate.bucket.lock_name().as_str()]);
                self.ensure_running(&lock_path)?;
                let guard = match self.lock(&lock_path).acquire().await? {
                    LockOutcome::Acquired(guard) => guard,
                    LockOutcome::NotAcquired { holder, .. } => {
                        record.add("status", "lock_timeout").add("lockholder", holder);
                        self.ctx.sink.emit(&record);
                        summary.lock_timeouts.push(candidate.bucket.dir_name());
                        continue;
                    }
                };

                self.locked(guard, self.remove_locked(&remote, &mut record))
                    .await?;
                self.ctx.sink.emit(&record);
                candidate.removed = true;
                summary.candidates.push(candidate);
            }
        }
        Ok(summary)
    }

    async fn remove_locked(&self, remote: &str, record: &mut StatusRecord) -> ArchiveResult<()> {
        let started = Instant::now();
        self.ctx.storage.remove(remote).await?;
        let remaining = self.ctx.storage.size(remote).await?;
        record
            .add("rmtime_ms", elapsed_ms(started))
            .add("bucketsize_after_b", remaining)
            .add("status", "removed");
        Ok(())
    }

    /// Per-index totals. Read-only, takes no locks.
    pub async fn stats(&self, indexes: &[String]) -> ArchiveResult<Vec<IndexStats>> {
        let mut stats = Vec::new();
        for index in self.select_indexes(indexes).await? {
            let collection = self.load_collection(&index).await?;
            let mut size_bytes = 0;
            for bucket in collection.iter() {
                size_bytes += self
                    .ctx
                    .storage
                    .size(&join_path([index.as_str(), bucket.dir_name().as_str()]))
                    .await?;
            }

            let entry = IndexStats {
                location: self.ctx.storage.describe(&index),
                size_bytes,
                bucket_count: collection.len(),
                earliest: collection.earliest(),
                latest: collection.latest(),
                index,
            };

            let mut record = StatusRecord::new();
            record
                .add("status", "none")
                .add("indexname", &entry.index)
                .add("destdir", &entry.location)
                .add("indexsize_b", entry.size_bytes)
                .add("bucketcount", entry.bucket_count);
            if let (Some(earliest), Some(latest)) = (entry.earliest, entry.latest) {
                record.add("earliest", earliest).add("latest", latest);
            }
            record.add("status", "indexstats");
            self.ctx.sink.emit(&record);

            stats.push(entry);
        }
        Ok(stats)
    }

    /// Archive containers matching `requested`, or all of them when empty.
    /// Every requested index must exist.
    async fn select_indexes(&self, requested: &[String]) -> ArchiveResult<Vec<String>> {
        let available = self.ctx.storage.list_containers().await?;
        if requested.is_empty() {
            return Ok(available);
        }
        if let Some(missing) = requested.iter().find(|i| !available.contains(i)) {
            return Err(ArchiveError::IndexNotFound(missing.clone()));
        }
        let wanted: BTreeSet<&String> = requested.iter().collect();
        Ok(available
            .into_iter()
            .filter(|i| wanted.contains(i))
            .collect())
    }

    /// Archived buckets of `index`. The first name that does not parse fails
    /// the whole listing.
    async fn load_collection(&self, index: &str) -> ArchiveResult<BucketCollection> {
        let names = self.ctx.storage.list(index).await?;
        BucketCollection::from_names(index, &names, None).map_err(|err| {
            error!(index = %index, error = %err, "malformed entry in archive");
            ArchiveError::from(err)
        })
    }

    /// Fail with [`ArchiveError::Interrupted`] once shutdown was requested,
    /// before `lock_path` is taken.
    fn ensure_running(&self, lock_path: &str) -> ArchiveResult<()> {
        if self.ctx.shutdown.is_cancelled() {
            return Err(ArchiveError::Interrupted {
                lock: self.ctx.storage.describe(lock_path),
            });
        }
        Ok(())
    }

    fn lock(&self, path: &str) -> DistributedLock {
        DistributedLock::new(
            self.ctx.storage.clone(),
            path,
            self.ctx.peer.hostname.clone(),
            self.ctx.locks,
        )
    }

    /// Run `work` while holding `guard`, then release it whatever the result.
    /// Cancellation of the shutdown token aborts `work`. A panic in `work` is
    /// resumed only after the lock marker is gone.
    async fn locked<T>(
        &self,
        guard: LockGuard,
        work: impl Future<Output = ArchiveResult<T>>,
    ) -> ArchiveResult<T> {
        let lock = self.ctx.storage.describe(guard.path());
        let outcome = tokio::select! {
            biased;
            _ = self.ctx.shutdown.cancelled() => {
                warn!(lock = %lock, "interrupted, releasing lock");
                Ok(Err(ArchiveError::Interrupted { lock: lock.clone() }))
            }
            outcome = AssertUnwindSafe(work).catch_unwind() => outcome,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                error!(lock = %lock, "panic while holding lock, releasing it");
                if let Err(err) = guard.release().await {
                    error!(lock = %lock, error = %err, "failed to release lock after panic");
                }
                panic::resume_unwind(payload);
            }
        };

        match (result, guard.release().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                error!(error = %release_err, "failed to release lock after error");
                Err(err)
            }
        }
    }
}

fn strip_trailing_separator(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Buckets live at `<index>/<db|colddb|thaweddb>/<bucket>`.
fn derive_index_name(bucket_dir: &Path) -> Option<String> {
    let index_dir = bucket_dir.parent()?.parent()?;
    match index_dir.components().next_back()? {
        Component::Normal(name) => name.to_str().map(str::to_string),
        _ => None,
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn read_raw_size(bucket_dir: &Path) -> Option<u64> {
    let contents = fs::read_to_string(bucket_dir.join(RAW_SIZE_FILE)).await.ok()?;
    contents.trim_end().parse().ok()
}

fn elapsed_ms(started: Instant) -> String {
    format!("{:.3}", started.elapsed().as_secs_f64() * 1000.0)
}

/// Reduce a local bucket to what has to be archived.
async fn strip_bucket(bucket_dir: &Path, preserve_search_files: bool) -> io::Result<StripMode> {
    let rawdata = bucket_dir.join(RAWDATA_DIR);
    let mut has_journal = false;
    for journal in JOURNALS {
        if fs::try_exists(rawdata.join(journal)).await? {
            has_journal = true;
            break;
        }
    }

    if has_journal {
        if preserve_search_files {
            debug!(bucket = %bucket_dir.display(), "search files required, skipping strip");
            return Ok(StripMode::Preserved);
        }
        remove_non_journal_files(bucket_dir).await?;
        remove_non_journal_files(&rawdata).await?;
        return Ok(StripMode::Journal);
    }

    compress_legacy_index_files(bucket_dir).await?;
    Ok(StripMode::Legacy)
}

/// Delete regular files in `dir` (not recursive) unless they are journals.
async fn remove_non_journal_files(dir: &Path) -> io::Result<()> {
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(JOURNAL_PREFIX) {
            continue;
        }
        debug!(file = %entry.path().display(), "removing file");
        fs::remove_file(entry.path()).await?;
    }
    Ok(())
}

/// Gzip every top-level `.tsidx` and `.data` file to `<name>.gz`.
async fn compress_legacy_index_files(bucket_dir: &Path) -> io::Result<()> {
    let mut entries = fs::read_dir(bucket_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type().await?.is_file()
            || !LEGACY_INDEX_SUFFIXES.iter().any(|s| name.ends_with(s))
        {
            continue;
        }
        let path = entry.path();
        debug!(file = %path.display(), "compressing legacy index file");
        tokio::task::spawn_blocking(move || gzip_in_place(&path))
            .await
            .map_err(io::Error::other)??;
    }
    Ok(())
}

fn gzip_in_place(path: &Path) -> io::Result<()> {
    let mut gz_path = path.as_os_str().to_owned();
    gz_path.push(".gz");

    let mut input = std::fs::File::open(path)?;
    let output = std::fs::File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(io::BufWriter::new(output), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    std::fs::remove_file(path)
}
