use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use frozen_archive::{
    errors::ArchiveError,
    models::{peer::PeerIdentity, time_range::TimeRange},
    services::{
        archive_service::{ArchiveContext, ArchiveOptions, ArchiveOutcome, ArchiveService},
        local_tree::tree_size,
        lock_service::LockSettings,
        status_sink::CollectingStatusSink,
        storage::{
            BackendKind, FilesystemBackend, ObjectStorageBackend, StorageBackend, StorageResult,
        },
    },
};
use object_store::memory::InMemory;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tokio::fs;
use tokio_util::sync::CancellationToken;

const JOURNAL_BYTES: usize = 300;

struct Harness {
    _archive: Option<TempDir>,
    local: TempDir,
    storage: Arc<dyn StorageBackend>,
    sink: Arc<CollectingStatusSink>,
    service: ArchiveService,
}

fn quick_locks() -> LockSettings {
    LockSettings {
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
        ..LockSettings::default()
    }
}

fn build(
    storage: Arc<dyn StorageBackend>,
    archive: Option<TempDir>,
    shutdown: CancellationToken,
) -> Harness {
    let sink = Arc::new(CollectingStatusSink::new());
    let ctx = ArchiveContext::new(
        storage.clone(),
        PeerIdentity::new("idx01", Some("LOCALGUID".into())),
        sink.clone(),
    )
    .with_lock_settings(quick_locks())
    .with_shutdown(shutdown);
    Harness {
        _archive: archive,
        local: tempfile::tempdir().unwrap(),
        storage,
        sink,
        service: ArchiveService::new(ctx),
    }
}

async fn filesystem_harness() -> Harness {
    let archive = tempfile::tempdir().unwrap();
    let storage = Arc::new(FilesystemBackend::connect(archive.path()).await.unwrap());
    build(storage, Some(archive), CancellationToken::new())
}

async fn object_storage_harness() -> Harness {
    let storage = Arc::new(
        ObjectStorageBackend::with_store(Arc::new(InMemory::new()), "frozen", "archive")
            .await
            .unwrap(),
    );
    build(storage, None, CancellationToken::new())
}

/// Forwards to `inner` and records every call that changes the archive.
struct RecordingStorage {
    inner: Arc<dyn StorageBackend>,
    mutations: Mutex<Vec<String>>,
}

impl RecordingStorage {
    fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            mutations: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: &str, path: &str) {
        self.mutations.lock().unwrap().push(format!("{call} {path}"));
    }

    fn take_mutations(&self) -> Vec<String> {
        std::mem::take(&mut *self.mutations.lock().unwrap())
    }
}

#[async_trait]
impl StorageBackend for RecordingStorage {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn describe(&self, path: &str) -> String {
        self.inner.describe(path)
    }

    async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.inner.size(path).await
    }

    async fn create_container(&self, name: &str) -> StorageResult<()> {
        self.record("create_container", name);
        self.inner.create_container(name).await
    }

    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        self.inner.list_containers().await
    }

    async fn copy_in(&self, local_source: &Path, path: &str) -> StorageResult<u64> {
        self.record("copy_in", path);
        self.inner.copy_in(local_source, path).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        self.record("remove", path);
        self.inner.remove(path).await
    }

    async fn restore_out(&self, path: &str, local_target: &Path) -> StorageResult<u64> {
        self.inner.restore_out(path, local_target).await
    }

    async fn lock_exists(&self, path: &str) -> bool {
        self.inner.lock_exists(path).await
    }

    async fn write_lock(&self, path: &str, payload: &str) -> StorageResult<bool> {
        self.record("write_lock", path);
        self.inner.write_lock(path, payload).await
    }

    async fn read_lock(&self, path: &str) -> StorageResult<String> {
        self.inner.read_lock(path).await
    }

    async fn lock_age(&self, path: &str) -> StorageResult<DateTime<Utc>> {
        self.inner.lock_age(path).await
    }

    async fn remove_lock(&self, path: &str) -> StorageResult<()> {
        self.record("remove_lock", path);
        self.inner.remove_lock(path).await
    }
}

/// Create `<local>/<index>/colddb/<name>` shaped like a journal-based bucket.
async fn make_bucket(h: &Harness, index: &str, name: &str, journal_bytes: usize) -> PathBuf {
    let dir = h.local.path().join(index).join("colddb").join(name);
    fs::create_dir_all(dir.join("rawdata")).await.unwrap();
    fs::write(dir.join("rawdata/journal.zst"), vec![7u8; journal_bytes])
        .await
        .unwrap();
    fs::write(dir.join("rawdata/slicesv2.dat"), vec![1u8; 40]).await.unwrap();
    fs::write(dir.join("1700000000-1600000000-123.tsidx"), vec![2u8; 500])
        .await
        .unwrap();
    fs::write(dir.join("bloomfilter"), vec![3u8; 64]).await.unwrap();
    fs::write(dir.join(".rawSize"), b"4096").await.unwrap();
    dir
}

async fn archive(h: &Harness, dir: &PathBuf) -> Result<ArchiveOutcome, ArchiveError> {
    h.service.archive(dir, ArchiveOptions::default()).await
}

fn days_ago(days: i64) -> i64 {
    (Utc::now() - ChronoDuration::days(days)).timestamp()
}

#[tokio::test]
async fn archive_strips_and_uploads_bucket() {
    let h = filesystem_harness().await;
    let dir = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;

    let outcome = archive(&h, &dir).await.unwrap();
    assert_eq!(
        outcome,
        ArchiveOutcome::Archived {
            destination: "main/db_200_100_1_GUIDA".into(),
            bytes: JOURNAL_BYTES as u64,
        }
    );
    assert_eq!(h.storage.size("main/db_200_100_1_GUIDA").await.unwrap(), JOURNAL_BYTES as u64);
    assert!(!h.storage.lock_exists("main/200_100_1_GUIDA.lock").await);

    let records = h.sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status(), Some("archived"));
    assert_eq!(record.get("indexname"), Some("main"));
    assert_eq!(record.get("bucketsize_raw_b"), Some("4096"));
    assert_eq!(record.get("bucketsize_b"), Some("300"));
    assert_eq!(record.get("bucketname_norm"), Some("200_100_1_GUIDA"));
    assert_eq!(record.fields().next().map(|(k, _)| k), Some("status"));
}

#[tokio::test]
async fn second_archive_of_replica_reports_existed() {
    let h = filesystem_harness().await;
    let original = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;
    archive(&h, &original).await.unwrap();

    let replica = make_bucket(&h, "main", "rb_200_100_1_GUIDA", JOURNAL_BYTES).await;
    let outcome = archive(&h, &replica).await.unwrap();
    assert_eq!(
        outcome,
        ArchiveOutcome::Existed {
            destination: "main/db_200_100_1_GUIDA".into()
        }
    );
    assert!(!h.storage.exists("main/rb_200_100_1_GUIDA").await);

    let last = h.sink.records().pop().unwrap();
    assert_eq!(last.status(), Some("existed"));
    assert_eq!(last.get("copytime_ms"), Some("0"));
    assert_eq!(h.storage.list("main").await.unwrap(), vec!["db_200_100_1_GUIDA"]);
}

#[tokio::test]
async fn size_mismatch_is_fatal_and_keeps_archive() {
    let h = filesystem_harness().await;
    let original = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;
    archive(&h, &original).await.unwrap();

    let different = make_bucket(&h, "other", "rb_200_100_1_GUIDA", JOURNAL_BYTES + 1).await;
    let err = h
        .service
        .archive(
            &different,
            ArchiveOptions {
                index: Some("main".into()),
                ..ArchiveOptions::default()
            },
        )
        .await
        .unwrap_err();
    match err {
        ArchiveError::SizeMismatch {
            source_size,
            destination_size,
            ..
        } => {
            assert_eq!(source_size, JOURNAL_BYTES as u64 + 1);
            assert_eq!(destination_size, JOURNAL_BYTES as u64);
        }
        other => panic!("expected size mismatch, got {other:?}"),
    }
    assert_eq!(h.storage.size("main/db_200_100_1_GUIDA").await.unwrap(), JOURNAL_BYTES as u64);
    assert!(!h.storage.lock_exists("main/200_100_1_GUIDA.lock").await);
}

#[tokio::test]
async fn local_bucket_uses_peer_guid() {
    let h = filesystem_harness().await;
    let dir = make_bucket(&h, "main", "db_200_100_7", JOURNAL_BYTES).await;
    archive(&h, &dir).await.unwrap();
    assert!(h.storage.exists("main/db_200_100_7_LOCALGUID").await);
}

#[tokio::test]
async fn invalid_buckets_are_rejected() {
    let h = filesystem_harness().await;
    let no_rawdata = h.local.path().join("main/colddb/db_2_1_1_G");
    fs::create_dir_all(&no_rawdata).await.unwrap();
    assert!(matches!(
        archive(&h, &no_rawdata).await,
        Err(ArchiveError::InvalidBucket { .. })
    ));

    let malformed = make_bucket(&h, "main", "xx_2_1_1_G", 10).await;
    assert!(matches!(
        archive(&h, &malformed).await,
        Err(ArchiveError::BucketName(_))
    ));
}

#[tokio::test]
async fn held_lock_times_out_without_touching_bucket() {
    let h = filesystem_harness().await;
    let dir = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;
    h.storage.create_container("main").await.unwrap();
    assert!(h.storage.write_lock("main/200_100_1_GUIDA.lock", "idx02").await.unwrap());

    let outcome = archive(&h, &dir).await.unwrap();
    assert_eq!(
        outcome,
        ArchiveOutcome::LockTimeout {
            holder: "idx02".into()
        }
    );
    assert!(fs::try_exists(dir.join("bloomfilter")).await.unwrap());
    assert!(!h.storage.exists("main/db_200_100_1_GUIDA").await);
    assert_eq!(h.sink.statuses(), vec!["lock_timeout"]);
}

#[tokio::test]
async fn shutdown_aborts_before_locking() {
    let archive_dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FilesystemBackend::connect(archive_dir.path()).await.unwrap());
    let shutdown = CancellationToken::new();
    let h = build(storage, Some(archive_dir), shutdown.clone());
    let dir = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;

    shutdown.cancel();
    assert!(matches!(
        archive(&h, &dir).await,
        Err(ArchiveError::Interrupted { .. })
    ));
    assert!(!h.storage.lock_exists("main/200_100_1_GUIDA.lock").await);
    assert!(!h.storage.exists("main/db_200_100_1_GUIDA").await);
}

#[tokio::test]
async fn restore_round_trip_matches_stripped_size() {
    let h = filesystem_harness().await;
    let first = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;
    let second = make_bucket(&h, "main", "db_400_300_2_GUIDA", 120).await;
    archive(&h, &first).await.unwrap();
    archive(&h, &second).await.unwrap();
    let stripped = tree_size(&first).await.unwrap();

    let thawed = tempfile::tempdir().unwrap();
    let summary = h
        .service
        .restore("main", TimeRange::new(150, 250).unwrap(), thawed.path())
        .await
        .unwrap();
    assert_eq!(summary.restored, vec!["db_200_100_1_GUIDA"]);
    assert_eq!(summary.bytes, stripped);
    assert_eq!(
        tree_size(&thawed.path().join("db_200_100_1_GUIDA")).await.unwrap(),
        stripped
    );
    assert!(!fs::try_exists(thawed.path().join("db_400_300_2_GUIDA")).await.unwrap());

    let again = h
        .service
        .restore("main", TimeRange::new(150, 350).unwrap(), thawed.path())
        .await
        .unwrap();
    assert_eq!(again.existed, vec!["db_200_100_1_GUIDA"]);
    assert_eq!(again.restored, vec!["db_400_300_2_GUIDA"]);

    let narrow = h
        .service
        .restore("main", TimeRange::new(250, 260).unwrap(), thawed.path())
        .await
        .unwrap();
    assert_eq!(narrow, Default::default());
}

#[tokio::test]
async fn restore_validates_arguments() {
    let h = filesystem_harness().await;
    let thawed = tempfile::tempdir().unwrap();
    assert!(matches!(
        h.service
            .restore("main", TimeRange::new(0, 10).unwrap(), thawed.path())
            .await,
        Err(ArchiveError::IndexNotFound(_))
    ));
    h.storage.create_container("main").await.unwrap();
    assert!(matches!(
        h.service
            .restore("main", TimeRange::new(0, 10).unwrap(), &thawed.path().join("missing"))
            .await,
        Err(ArchiveError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn restore_over_local_copy_with_extra_file_is_fatal() {
    let h = filesystem_harness().await;
    let bucket = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;
    archive(&h, &bucket).await.unwrap();

    let thawed = tempfile::tempdir().unwrap();
    let local = thawed.path().join("db_200_100_1_GUIDA");
    fs::create_dir_all(&local).await.unwrap();
    fs::write(local.join("leftover"), vec![0u8; 7]).await.unwrap();

    let err = h
        .service
        .restore("main", TimeRange::new(0, 1000).unwrap(), thawed.path())
        .await
        .unwrap_err();
    match err {
        ArchiveError::SizeMismatch {
            source_size,
            destination_size,
            destination,
            ..
        } => {
            assert_eq!(source_size, JOURNAL_BYTES as u64);
            assert_eq!(destination_size, JOURNAL_BYTES as u64 + 7);
            assert!(destination.ends_with("db_200_100_1_GUIDA"));
        }
        other => panic!("expected size mismatch, got {other:?}"),
    }
    assert!(!h.storage.lock_exists("main/200_100_1_GUIDA.lock").await);
}

async fn archive_aged(h: &Harness, index: &str, end_days_ago: i64, id: u32) -> String {
    let end = days_ago(end_days_ago);
    let name = format!("db_{end}_{}_{id}_GUIDA", end - 3600);
    let dir = make_bucket(h, index, &name, 100 + id as usize).await;
    archive(h, &dir).await.unwrap();
    name
}

#[tokio::test]
async fn prune_dry_run_changes_nothing() {
    let archive_dir = tempfile::tempdir().unwrap();
    let inner = Arc::new(FilesystemBackend::connect(archive_dir.path()).await.unwrap());
    let recording = Arc::new(RecordingStorage::new(inner));
    let h = build(recording.clone(), Some(archive_dir), CancellationToken::new());
    let old = archive_aged(&h, "main", 40, 1).await;
    let recent = archive_aged(&h, "main", 5, 2).await;
    let before = h.storage.list("main").await.unwrap();
    assert!(!recording.take_mutations().is_empty());

    let summary = h.service.prune(&[], 30, true, Utc::now()).await.unwrap();
    assert_eq!(recording.take_mutations(), Vec::<String>::new());
    assert_eq!(summary.candidates.len(), 1);
    assert_eq!(summary.candidates[0].bucket.dir_name(), old);
    assert!(!summary.candidates[0].removed);
    assert_eq!(h.storage.list("main").await.unwrap(), before);
    assert_eq!(h.storage.size(&format!("main/{old}")).await.unwrap(), 101);
    assert_eq!(h.sink.statuses().last().map(String::as_str), Some("dryrun"));

    let summary = h
        .service
        .prune(&["main".to_string()], 30, false, Utc::now())
        .await
        .unwrap();
    assert!(summary.candidates[0].removed);
    assert_eq!(h.storage.list("main").await.unwrap(), vec![recent]);
    let lock = format!("main/{}.lock", &old[3..]);
    assert_eq!(
        recording.take_mutations(),
        vec![
            format!("write_lock {lock}"),
            format!("remove main/{old}"),
            format!("remove_lock {lock}"),
        ]
    );
    let last = h.sink.records().pop().unwrap();
    assert_eq!(last.status(), Some("removed"));
    assert_eq!(last.get("bucketsize_after_b"), Some("0"));
}

#[tokio::test]
async fn prune_with_malformed_entry_removes_nothing() {
    let archive_dir = tempfile::tempdir().unwrap();
    let broken = archive_dir.path().join("zzz/db_notanumber_1_1_GUIDA");
    let h = {
        let storage = Arc::new(FilesystemBackend::connect(archive_dir.path()).await.unwrap());
        build(storage, Some(archive_dir), CancellationToken::new())
    };
    let old = archive_aged(&h, "main", 40, 1).await;
    fs::create_dir_all(&broken).await.unwrap();
    fs::write(broken.join("journal.zst"), b"x").await.unwrap();

    assert!(matches!(
        h.service.prune(&[], 30, false, Utc::now()).await,
        Err(ArchiveError::BucketName(_))
    ));
    assert_eq!(h.storage.list("main").await.unwrap(), vec![old]);
    assert!(matches!(
        h.service.stats(&["zzz".to_string()]).await,
        Err(ArchiveError::BucketName(_))
    ));
}

#[tokio::test]
async fn prune_with_huge_retention_selects_nothing() {
    let h = filesystem_harness().await;
    archive_aged(&h, "main", 40, 1).await;
    let summary = h.service.prune(&[], u32::MAX, false, Utc::now()).await.unwrap();
    assert!(summary.candidates.is_empty());
    assert_eq!(h.storage.list("main").await.unwrap().len(), 1);
}

#[tokio::test]
async fn prune_rejects_unknown_index() {
    let h = filesystem_harness().await;
    archive_aged(&h, "main", 40, 1).await;
    assert!(matches!(
        h.service
            .prune(&["main".to_string(), "nope".to_string()], 30, false, Utc::now())
            .await,
        Err(ArchiveError::IndexNotFound(name)) if name == "nope"
    ));
    assert_eq!(h.storage.list("main").await.unwrap().len(), 1);
}

#[tokio::test]
async fn stats_fold_sizes_and_bounds() {
    let h = filesystem_harness().await;
    let a = make_bucket(&h, "main", "db_200_100_1_GUIDA", 300).await;
    let b = make_bucket(&h, "main", "rb_400_300_2_GUIDB", 200).await;
    archive(&h, &a).await.unwrap();
    archive(&h, &b).await.unwrap();
    h.storage.create_container("empty").await.unwrap();

    let stats = h.service.stats(&[]).await.unwrap();
    assert_eq!(stats.len(), 2);
    let empty = &stats[0];
    assert_eq!((empty.index.as_str(), empty.bucket_count, empty.size_bytes), ("empty", 0, 0));
    assert_eq!((empty.earliest, empty.latest), (None, None));

    let main = &stats[1];
    assert_eq!(main.index, "main");
    assert_eq!(main.bucket_count, 2);
    assert_eq!(main.size_bytes, 500);
    assert_eq!((main.earliest, main.latest), (Some(100), Some(400)));

    let records = h.sink.records();
    let main_record = records.last().unwrap();
    assert_eq!(main_record.status(), Some("indexstats"));
    assert_eq!(main_record.get("earliest"), Some("100"));
    assert!(records[records.len() - 2].get("earliest").is_none());

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json[1]["size_bytes"], 500);

    let only_main = h.service.stats(&["main".to_string()]).await.unwrap();
    assert_eq!(only_main.len(), 1);
}

#[tokio::test]
async fn object_storage_flows() {
    let h = object_storage_harness().await;
    let first = make_bucket(&h, "main", "db_200_100_1_GUIDA", JOURNAL_BYTES).await;
    let outcome = archive(&h, &first).await.unwrap();
    assert!(
        matches!(outcome, ArchiveOutcome::Archived { bytes, .. } if bytes == JOURNAL_BYTES as u64)
    );

    let replica = make_bucket(&h, "main", "rb_200_100_1_GUIDA", JOURNAL_BYTES).await;
    assert!(matches!(
        archive(&h, &replica).await.unwrap(),
        ArchiveOutcome::Existed { .. }
    ));
    assert_eq!(h.storage.list_containers().await.unwrap(), vec!["main"]);

    let thawed = tempfile::tempdir().unwrap();
    let summary = h
        .service
        .restore("main", TimeRange::new(0, 1000).unwrap(), thawed.path())
        .await
        .unwrap();
    assert_eq!(summary.restored, vec!["db_200_100_1_GUIDA"]);
    let restored = fs::read(thawed.path().join("db_200_100_1_GUIDA/rawdata/journal.zst"))
        .await
        .unwrap();
    assert_eq!(restored.len(), JOURNAL_BYTES);

    let stats = h.service.stats(&[]).await.unwrap();
    assert_eq!(stats[0].size_bytes, JOURNAL_BYTES as u64);
    assert_eq!(stats[0].location, "s3://frozen/archive/main");

    let pruned = h.service.prune(&[], 1, false, Utc::now()).await.unwrap();
    assert_eq!(pruned.candidates.len(), 1);
    assert!(!h.storage.exists("main/db_200_100_1_GUIDA").await);
    assert!(h.storage.list("main").await.unwrap().is_empty());
}
