use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use frozen_archive::{
    config::{AppConfig, Args, Command},
    errors::ArchiveError,
    models::{peer::PeerIdentity, status::format_bytes, time_range::TimeRange},
    services::{
        archive_service::{ArchiveContext, ArchiveOptions, ArchiveOutcome, ArchiveService},
        lock_service::LockSettings,
        rebuild_service::RebuildService,
        status_sink::{StatusSink, TracingStatusSink},
        storage,
    },
};
use std::{process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Another peer holds the bucket lock; the caller should retry later.
const EXIT_LOCK_TIMEOUT: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // --- Logging setup ---
    let default_level = if args.global.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    match run(args, shutdown).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, shutdown: CancellationToken) -> Result<ExitCode> {
    let verbose = args.global.verbose;
    let cfg = AppConfig::from_env_and_args(args.global)?;
    tracing::debug!("Starting frozen-archive with config: {:?}", cfg);

    let peer = PeerIdentity::load(&cfg.instance_cfg)
        .await
        .with_context(|| format!("loading peer identity from {}", cfg.instance_cfg.display()))?;
    let sink: Arc<dyn StatusSink> = Arc::new(TracingStatusSink);

    // The rebuild tool works on local thawed buckets only.
    if let Command::Rebuild {
        index,
        thawed_dir,
        workers,
    } = &args.command
    {
        let service = RebuildService::new(cfg.rebuild_bin.clone(), sink, peer.guid.clone());
        let report = service.rebuild(index, thawed_dir, *workers).await?;
        tracing::info!(rebuilt = report.rebuilt.len(), "rebuild complete");
        return Ok(ExitCode::SUCCESS);
    }

    let storage = storage::connect(&cfg.backend)
        .await
        .context("connecting to archive storage")?;
    let ctx = ArchiveContext::new(storage, peer, sink)
        .with_lock_settings(LockSettings {
            timeout: cfg.lock_timeout,
            ..LockSettings::default()
        })
        .with_shutdown(shutdown);
    let service = ArchiveService::new(ctx);

    match args.command {
        Command::Archive {
            bucket_dir,
            search_files_required,
            index,
        } => {
            let options = ArchiveOptions {
                preserve_search_files: search_files_required,
                index,
            };
            match service.archive(&bucket_dir, options).await? {
                ArchiveOutcome::Archived { .. } | ArchiveOutcome::Existed { .. } => {
                    Ok(ExitCode::SUCCESS)
                }
                ArchiveOutcome::LockTimeout { .. } => Ok(ExitCode::from(EXIT_LOCK_TIMEOUT)),
            }
        }
        Command::Restore {
            index,
            start,
            end,
            thawed_dir,
        } => {
            let range = TimeRange::from_days(&start, &end)
                .map_err(|e| ArchiveError::InvalidArgument(e.to_string()))?;
            let summary = service.restore(&index, range, &thawed_dir).await?;
            tracing::info!(
                restored = summary.restored.len(),
                existed = summary.existed.len(),
                lock_timeouts = summary.lock_timeouts.len(),
                size = %format_bytes(summary.bytes),
                "restore complete"
            );
            Ok(lock_timeout_exit(summary.lock_timeouts.is_empty()))
        }
        Command::Prune {
            index,
            days,
            dry_run,
        } => {
            let summary = service.prune(&index, days, dry_run, Utc::now()).await?;
            if dry_run {
                for candidate in &summary.candidates {
                    println!(
                        "(dry run) remove bucket (bucket_end: {}, size: {}) {}",
                        format_epoch(candidate.bucket.end),
                        format_bytes(candidate.size),
                        candidate.location
                    );
                }
            }
            Ok(lock_timeout_exit(summary.lock_timeouts.is_empty()))
        }
        Command::Stats { index, json } => {
            let stats = service.stats(&index).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else if verbose {
                for entry in &stats {
                    println!(
                        "Index: {}, Buckets: {}, Size: {}, Earliest: {}, Latest: {}, Destdir: {}",
                        entry.index,
                        entry.bucket_count,
                        format_bytes(entry.size_bytes),
                        entry.earliest.map(format_epoch).unwrap_or_else(|| "-".into()),
                        entry.latest.map(format_epoch).unwrap_or_else(|| "-".into()),
                        entry.location
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Rebuild { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn lock_timeout_exit(all_locked: bool) -> ExitCode {
    if all_locked {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_LOCK_TIMEOUT)
    }
}

fn format_epoch(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.format("%d.%m.%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!("Cannot install SIGTERM handler: {}", err);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::warn!("Shutdown signal received, aborting current operation");
    token.cancel();
}
