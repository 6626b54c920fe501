//! Identity of the local cluster peer.

use std::{io, path::Path};
use tokio::fs;
use tracing::{debug, warn};

/// Hostname and GUID of the peer running this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Short hostname (domain stripped), written into lock markers.
    pub hostname: String,

    /// Peer GUID from the instance identity file, used for local buckets.
    pub guid: Option<String>,
}

impl PeerIdentity {
    pub fn new(hostname: impl Into<String>, guid: Option<String>) -> Self {
        Self {
            hostname: hostname.into(),
            guid,
        }
    }

    /// Resolve the local hostname and read the GUID from `instance_cfg`.
    ///
    /// A missing identity file is not fatal here; only legacy bucket names
    /// need the GUID and they fail with a dedicated error.
    pub async fn load(instance_cfg: &Path) -> io::Result<Self> {
        let hostname = local_short_hostname()?;
        let guid = match fs::read_to_string(instance_cfg).await {
            Ok(contents) => parse_instance_guid(&contents),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %instance_cfg.display(), "instance identity file not found");
                None
            }
            Err(err) => return Err(err),
        };
        debug!(hostname = %hostname, guid = ?guid, "resolved peer identity");
        Ok(Self { hostname, guid })
    }

    pub fn guid(&self) -> Option<&str> {
        self.guid.as_deref()
    }
}

/// Host name up to the first dot.
pub fn local_short_hostname() -> io::Result<String> {
    let full = hostname::get()?;
    let full = full.to_string_lossy();
    Ok(short_hostname(&full).to_string())
}

fn short_hostname(full: &str) -> &str {
    full.split('.').next().unwrap_or(full)
}

/// Extract the value of the first `guid = ...` line.
pub fn parse_instance_guid(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() != "guid" || line.starts_with(char::is_whitespace) {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
