//! Parallel rebuild of restored buckets.
//!
//! A fixed number of workers pop bucket directories from a shared FIFO queue
//! and run the external rebuild executable on each one. The executable writes
//! its diagnostics to stderr; lines are forwarded to `tracing` at the level
//! they announce.

use crate::errors::{ArchiveError, ArchiveResult};
use crate::models::{bucket::BucketName, status::StatusRecord};
use crate::services::status_sink::StatusSink;
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Instant,
};
use tokio::{fs, process::Command, sync::Mutex, task::JoinSet};
use tracing::{Level, debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub rebuilt: Vec<String>,
    pub failed: Vec<String>,
}

impl RebuildReport {
    pub fn total(&self) -> usize {
        self.rebuilt.len() + self.failed.len()
    }
}

pub struct RebuildService {
    executable: PathBuf,
    sink: Arc<dyn StatusSink>,
    local_guid: Option<String>,
}

struct BucketTask {
    name: String,
    dir: PathBuf,
}

impl RebuildService {
    pub fn new(
        executable: impl Into<PathBuf>,
        sink: Arc<dyn StatusSink>,
        local_guid: Option<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            sink,
            local_guid,
        }
    }

    /// Rebuild every bucket directory under `thawed_dir` with `workers`
    /// concurrent child processes.
    ///
    /// Each bucket runs exactly once. Fails with
    /// [`ArchiveError::RebuildFailed`] when any rebuild did not succeed.
    pub async fn rebuild(
        &self,
        index: &str,
        thawed_dir: &Path,
        workers: usize,
    ) -> ArchiveResult<RebuildReport> {
        if workers == 0 {
            return Err(ArchiveError::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        if !fs::metadata(thawed_dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(ArchiveError::InvalidArgument(format!(
                "thawed directory `{}` does not exist",
                thawed_dir.display()
            )));
        }

        let tasks = self.scan(thawed_dir).await?;
        let total = tasks.len();
        info!(index = %index, buckets = total, workers, "rebuilding thawed buckets");

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let mut pool = JoinSet::new();
        for worker in 0..workers.min(total.max(1)) {
            let queue = queue.clone();
            let executable = self.executable.clone();
            let sink = self.sink.clone();
            let index = index.to_string();
            pool.spawn(async move {
                let mut done = Vec::new();
                loop {
                    let Some(task) = queue.lock().await.pop_front() else {
                        break;
                    };
                    debug!(worker, bucket = %task.name, "rebuild started");
                    let ok = rebuild_one(&executable, &index, &task, sink.as_ref()).await;
                    done.push((task.name, ok));
                }
                done
            });
        }

        let mut report = RebuildReport::default();
        while let Some(joined) = pool.join_next().await {
            let done = joined.map_err(|e| ArchiveError::Io(std::io::Error::other(e)))?;
            for (name, ok) in done {
                if ok {
                    report.rebuilt.push(name);
                } else {
                    report.failed.push(name);
                }
            }
        }
        report.rebuilt.sort();
        report.failed.sort();

        if !report.failed.is_empty() {
            error!(failed = report.failed.len(), total, "bucket rebuilds failed");
            return Err(ArchiveError::RebuildFailed {
                failed: report.failed.len(),
                total,
            });
        }
        Ok(report)
    }

    /// Subdirectories whose names parse as buckets, in name order.
    async fn scan(&self, thawed_dir: &Path) -> ArchiveResult<Vec<BucketTask>> {
        let mut tasks = Vec::new();
        let mut entries = fs::read_dir(thawed_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match BucketName::parse(&name, self.local_guid.as_deref()) {
                Ok(_) => tasks.push(BucketTask {
                    name,
                    dir: entry.path(),
                }),
                Err(err) => {
                    debug!(dir = %entry.path().display(), error = %err, "not a bucket, skipping")
                }
            }
        }
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }
}

async fn rebuild_one(
    executable: &Path,
    index: &str,
    task: &BucketTask,
    sink: &dyn StatusSink,
) -> bool {
    let started = Instant::now();
    let mut record = StatusRecord::new();
    record
        .add("status", "none")
        .add("indexname", index)
        .add("bucketname", &task.name)
        .add("bucketdir", task.dir.display());

    let output = Command::new(executable)
        .arg("rebuild")
        .arg(&task.dir)
        .arg(index)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    let ok = match output {
        Ok(output) => {
            forward_output(&String::from_utf8_lossy(&output.stderr));
            if let Some(code) = output.status.code() {
                record.add("exitcode", code);
            }
            output.status.success()
        }
        Err(err) => {
            error!(executable = %executable.display(), error = %err, "cannot start rebuild");
            record.add("error", err);
            false
        }
    };

    record
        .add("rebuildtime_ms", format!("{:.3}", started.elapsed().as_secs_f64() * 1000.0))
        .add("status", if ok { "rebuilt" } else { "failed" });
    sink.emit(&record);
    ok
}

/// Level announced by a line of rebuild output, most severe first.
fn line_level(line: &str) -> Option<Level> {
    if line.contains("ERROR") {
        Some(Level::ERROR)
    } else if line.contains("WARN") {
        Some(Level::WARN)
    } else if line.contains("INFO") {
        Some(Level::INFO)
    } else {
        None
    }
}

fn forward_output(output: &str) {
    for line in output.lines() {
        match line_level(line) {
            Some(Level::ERROR) => error!("{line}"),
            Some(Level::WARN) => warn!("{line}"),
            Some(_) => info!("{line}"),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::status_sink::CollectingStatusSink;

    async fn thawed(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs::create_dir_all(dir.path().join(name).join("rawdata"))
                .await
                .unwrap();
        }
        fs::write(dir.path().join("db_9_9_9_G"), b"a file, not a bucket")
            .await
            .unwrap();
        fs::create_dir_all(dir.path().join("lost+found")).await.unwrap();
        dir
    }

    #[test]
    fn classifies_output_lines() {
        assert_eq!(line_level("01-01 ERROR BucketRebuilder - x"), Some(Level::ERROR));
        assert_eq!(line_level("WARN something"), Some(Level::WARN));
        assert_eq!(line_level("INFO done"), Some(Level::INFO));
        assert_eq!(line_level("Rebuilding bucket"), None);
    }

    #[tokio::test]
    async fn every_bucket_runs_once() {
        let names = [
            "db_2_1_1_G",
            "db_4_3_2_G",
            "rb_6_5_3_H",
            "db_8_7_4_G",
            "db_10_9_5_G",
        ];
        let dir = thawed(&names).await;
        let sink = Arc::new(CollectingStatusSink::new());
        let service = RebuildService::new("true", sink.clone(), None);

        let report = service.rebuild("main", dir.path(), 3).await.unwrap();
        let mut expected: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(report.rebuilt, expected);
        assert!(report.failed.is_empty());
        assert_eq!(sink.statuses(), vec!["rebuilt"; 5]);
    }

    #[tokio::test]
    async fn failures_are_reported() {
        let dir = thawed(&["db_2_1_1_G", "db_4_3_2_G"]).await;
        let sink = Arc::new(CollectingStatusSink::new());
        let service = RebuildService::new("false", sink.clone(), None);

        match service.rebuild("main", dir.path(), 4).await {
            Err(ArchiveError::RebuildFailed { failed, total }) => {
                assert_eq!((failed, total), (2, 2));
            }
            other => panic!("expected rebuild failure, got {other:?}"),
        }
        assert_eq!(sink.statuses(), vec!["failed"; 2]);
    }

    #[tokio::test]
    async fn missing_executable_fails_each_bucket() {
        let dir = thawed(&["db_2_1_1_G"]).await;
        let sink = Arc::new(CollectingStatusSink::new());
        let service = RebuildService::new(dir.path().join("no-such-binary"), sink.clone(), None);
        assert!(matches!(
            service.rebuild("main", dir.path(), 1).await,
            Err(ArchiveError::RebuildFailed { failed: 1, total: 1 })
        ));
    }

    #[tokio::test]
    async fn validates_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let service = RebuildService::new("true", Arc::new(CollectingStatusSink::new()), None);
        assert!(matches!(
            service.rebuild("main", dir.path(), 0).await,
            Err(ArchiveError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.rebuild("main", &dir.path().join("missing"), 2).await,
            Err(ArchiveError::InvalidArgument(_))
        ));
        let empty = service.rebuild("main", dir.path(), 2).await.unwrap();
        assert_eq!(empty.total(), 0);
    }
}
