use crate::services::lock_service::DEFAULT_LOCK_TIMEOUT;
use crate::services::storage::ObjectStorageConfig;
use crate::services::storage::object_storage::CertVerification;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};

const DEFAULT_SPLUNK_HOME: &str = "/opt/splunk";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub instance_cfg: PathBuf,
    pub rebuild_bin: PathBuf,
    pub lock_timeout: Duration,
    pub verbose: bool,
}

/// Which archive to talk to and how.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Filesystem { root: PathBuf },
    ObjectStorage(ObjectStorageConfig),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Archive, restore and prune frozen index buckets")]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Storage backend: `filesystem` or `object-storage` (overrides FROZEN_ARCHIVE_BACKEND)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Archive root directory, or key prefix inside the S3 bucket (overrides FROZEN_ARCHIVE_ROOT)
    #[arg(long, global = true)]
    pub root: Option<String>,

    /// S3 bucket holding the archive (overrides FROZEN_ARCHIVE_S3_BUCKET)
    #[arg(long, global = true)]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint (overrides FROZEN_ARCHIVE_S3_ENDPOINT)
    #[arg(long, global = true)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides FROZEN_ARCHIVE_S3_REGION)
    #[arg(long, global = true)]
    pub s3_region: Option<String>,

    /// `false` or a PEM certificate file (overrides FROZEN_ARCHIVE_S3_VERIFY_CERT)
    #[arg(long, global = true)]
    pub s3_verify_cert: Option<String>,

    /// Instance identity file holding the peer guid (overrides FROZEN_ARCHIVE_INSTANCE_CFG)
    #[arg(long, global = true)]
    pub instance_cfg: Option<PathBuf>,

    /// Debug logging and human-readable output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Archive one frozen bucket directory
    Archive {
        /// Bucket directory, usually `<index>/colddb/<bucket>`
        bucket_dir: PathBuf,

        /// Keep search files of journal-based buckets
        #[arg(long)]
        search_files_required: bool,

        /// Index name instead of the one derived from the bucket path
        #[arg(short, long)]
        index: Option<String>,
    },

    /// Restore archived buckets overlapping a day range
    Restore {
        #[arg(short, long)]
        index: String,

        /// First day, DDMMYYYY or YYYY-MM-DD
        #[arg(short, long)]
        start: String,

        /// Last day (inclusive), DDMMYYYY or YYYY-MM-DD
        #[arg(short, long)]
        end: String,

        /// Directory receiving the restored buckets
        #[arg(short, long)]
        thawed_dir: PathBuf,
    },

    /// Remove archived buckets older than a number of days
    Prune {
        /// Restrict to these indexes (repeatable)
        #[arg(short, long)]
        index: Vec<String>,

        #[arg(short, long)]
        days: u32,

        /// Only report what would be removed
        #[arg(short = 'r', long)]
        dry_run: bool,
    },

    /// Report size and time bounds per archived index
    Stats {
        /// Restrict to these indexes (repeatable)
        #[arg(short, long)]
        index: Vec<String>,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild restored buckets with the external rebuild tool
    Rebuild {
        #[arg(short, long)]
        index: String,

        #[arg(short, long)]
        thawed_dir: PathBuf,

        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },
}

impl AppConfig {
    /// Merge parsed global CLI args over environment variables.
    pub fn from_env_and_args(args: GlobalArgs) -> Result<Self> {
        Self::resolve(args, |key| env::var(key))
    }

    /// Merge flags over values looked up through `var`.
    pub fn resolve(
        args: GlobalArgs,
        var: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let lookup = |key: &str| -> Result<Option<String>> {
            match var(key) {
                Ok(value) if value.is_empty() => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {key}")),
            }
        };

        let splunk_home = PathBuf::from(
            lookup("SPLUNK_HOME")?.unwrap_or_else(|| DEFAULT_SPLUNK_HOME.into()),
        );

        // --- Environment fallback ---
        let backend_name = match args.backend {
            Some(name) => name,
            None => lookup("FROZEN_ARCHIVE_BACKEND")?.unwrap_or_else(|| "filesystem".into()),
        };
        let root = match args.root {
            Some(root) => Some(root),
            None => lookup("FROZEN_ARCHIVE_ROOT")?,
        };

        let backend = match backend_name.as_str() {
            "filesystem" | "dir" => {
                let root = root.context(
                    "archive root not configured, set FROZEN_ARCHIVE_ROOT or pass --root",
                )?;
                BackendConfig::Filesystem { root: root.into() }
            }
            "object-storage" | "s3" => {
                let bucket = match args.s3_bucket {
                    Some(bucket) => bucket,
                    None => lookup("FROZEN_ARCHIVE_S3_BUCKET")?.context(
                        "s3 bucket not configured, set FROZEN_ARCHIVE_S3_BUCKET or pass --s3-bucket",
                    )?,
                };
                let verify_cert = match args.s3_verify_cert {
                    Some(value) => Some(value),
                    None => lookup("FROZEN_ARCHIVE_S3_VERIFY_CERT")?,
                };
                BackendConfig::ObjectStorage(ObjectStorageConfig {
                    bucket,
                    archive_dir: root.unwrap_or_default(),
                    access_key: lookup("AWS_ACCESS_KEY_ID")?,
                    secret_key: lookup("AWS_SECRET_ACCESS_KEY")?,
                    region: match args.s3_region {
                        Some(region) => Some(region),
                        None => lookup("FROZEN_ARCHIVE_S3_REGION")?,
                    },
                    endpoint: match args.s3_endpoint {
                        Some(endpoint) => Some(endpoint),
                        None => lookup("FROZEN_ARCHIVE_S3_ENDPOINT")?,
                    },
                    verify_cert: parse_verify_cert(verify_cert.as_deref())?,
                })
            }
            other => bail!("unknown backend `{other}`, expected `filesystem` or `object-storage`"),
        };

        let instance_cfg = match args.instance_cfg {
            Some(path) => path,
            None => lookup("FROZEN_ARCHIVE_INSTANCE_CFG")?
                .map(PathBuf::from)
                .unwrap_or_else(|| splunk_home.join("etc").join("instance.cfg")),
        };
        let rebuild_bin = lookup("FROZEN_ARCHIVE_REBUILD_BIN")?
            .map(PathBuf::from)
            .unwrap_or_else(|| splunk_home.join("bin").join("splunk"));
        let lock_timeout = match lookup("FROZEN_ARCHIVE_LOCK_TIMEOUT_SECS")? {
            Some(value) => Duration::from_secs(
                value.parse::<u64>().with_context(|| {
                    format!("parsing FROZEN_ARCHIVE_LOCK_TIMEOUT_SECS value `{}`", value)
                })?,
            ),
            None => DEFAULT_LOCK_TIMEOUT,
        };

        // --- Merge ---
        Ok(Self {
            backend,
            instance_cfg,
            rebuild_bin,
            lock_timeout,
            verbose: args.verbose,
        })
    }
}

/// `false` disables verification, a path adds a PEM root certificate.
fn parse_verify_cert(value: Option<&str>) -> Result<CertVerification> {
    match value {
        None => Ok(CertVerification::System),
        Some(v) if v.eq_ignore_ascii_case("false") => Ok(CertVerification::Disabled),
        Some(v) if v.eq_ignore_ascii_case("true") => Ok(CertVerification::System),
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.is_file() {
                bail!(
                    "value `{}` for FROZEN_ARCHIVE_S3_VERIFY_CERT not supported, must be `false` or a readable pem file",
                    path.display()
                );
            }
            Ok(CertVerification::RootCertificate(path))
        }
    }
}
