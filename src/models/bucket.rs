//! Represents a frozen bucket identity parsed from its directory name.
//!
//! Bucket directories are named `<prefix>_<end>_<start>_<id>[_<peerGuid>]`.
//! Buckets created on the local peer omit the GUID; replicated copies carry the
//! GUID of the peer that originally built them.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of `_`-separated components after the prefix in a local bucket name.
const LEGACY_COMPONENTS: usize = 3;

/// Number of `_`-separated components after the prefix in a replicated bucket name.
const REPLICATED_COMPONENTS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BucketNameError {
    #[error("bucket name `{name}` malformed: {reason}")]
    Malformed { name: String, reason: String },
    #[error("bucket `{name}` carries no peer guid and the local peer guid is unknown")]
    MissingPeerGuid { name: String },
}

impl BucketNameError {
    fn malformed(name: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Bucket class encoded in the first component of the directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketPrefix {
    /// Bucket built by the peer that owns it.
    Db,
    /// Replica received from another peer.
    Rb,
}

impl BucketPrefix {
    pub const ALL: [BucketPrefix; 2] = [BucketPrefix::Db, BucketPrefix::Rb];

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketPrefix::Db => "db",
            BucketPrefix::Rb => "rb",
        }
    }
}

impl fmt::Display for BucketPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketPrefix {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "db" => Ok(BucketPrefix::Db),
            "rb" => Ok(BucketPrefix::Rb),
            _ => Err(()),
        }
    }
}

/// Where the peer GUID of a parsed bucket came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidSource {
    /// The directory name carried the GUID (replicated bucket).
    Name,
    /// The GUID was taken from the local peer identity.
    LocalPeer,
}

/// Immutable identity of a bucket.
///
/// Equality covers every identity component, so a legacy name and its
/// normalized (GUID-bearing) form parse to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BucketName {
    /// Bucket class (`db` or `rb`). Metadata only, never used for filtering.
    pub prefix: BucketPrefix,

    /// Latest event time in the bucket, Unix epoch seconds.
    pub end: i64,

    /// Earliest event time in the bucket, Unix epoch seconds.
    pub start: i64,

    /// Per-peer sequence id.
    pub id: u64,

    /// GUID of the peer that created the bucket.
    pub peer_guid: String,
}

impl BucketName {
    /// Parse a raw bucket directory name.
    ///
    /// `local_guid` is appended when the name uses the three-component local
    /// form. Nothing on disk is touched.
    pub fn parse(raw: &str, local_guid: Option<&str>) -> Result<Self, BucketNameError> {
        let parts: Vec<&str> = raw.split('_').collect();
        let (prefix, rest) = parts
            .split_first()
            .ok_or_else(|| BucketNameError::malformed(raw, "empty name"))?;

        let prefix: BucketPrefix = prefix
            .parse()
            .map_err(|_| BucketNameError::malformed(raw, format!("unknown prefix `{prefix}`")))?;

        let peer_guid = match rest.len() {
            LEGACY_COMPONENTS => match local_guid {
                Some(guid) if !guid.is_empty() => guid.to_string(),
                _ => {
                    return Err(BucketNameError::MissingPeerGuid {
                        name: raw.to_string(),
                    });
                }
            },
            REPLICATED_COMPONENTS => {
                if rest[3].is_empty() {
                    return Err(BucketNameError::malformed(raw, "empty peer guid"));
                }
                rest[3].to_string()
            }
            n => {
                return Err(BucketNameError::malformed(
                    raw,
                    format!("expected 3 or 4 components after the prefix, found {n}"),
                ));
            }
        };

        let end = parse_number::<i64>(raw, "end", rest[0])?;
        let start = parse_number::<i64>(raw, "start", rest[1])?;
        let id = parse_number::<u64>(raw, "id", rest[2])?;

        if end < start {
            return Err(BucketNameError::malformed(
                raw,
                format!("end {end} is before start {start}"),
            ));
        }

        Ok(Self {
            prefix,
            end,
            start,
            id,
            peer_guid,
        })
    }

    /// Report whether `raw` carries its own GUID or relies on the local peer.
    pub fn guid_source(raw: &str) -> GuidSource {
        if raw.split('_').count() == REPLICATED_COMPONENTS + 1 {
            GuidSource::Name
        } else {
            GuidSource::LocalPeer
        }
    }

    /// Returns true when `name` looks like an archived bucket directory.
    pub fn is_bucket_like(name: &str) -> bool {
        BucketPrefix::ALL
            .iter()
            .any(|p| name.strip_prefix(p.as_str()).is_some_and(|r| r.starts_with('_')))
    }

    /// `<end>_<start>_<id>_<peerGuid>`, shared by every replica of the bucket.
    pub fn normalized_name(&self) -> String {
        format!("{}_{}_{}_{}", self.end, self.start, self.id, self.peer_guid)
    }

    /// `<prefix>_<normalized>`, the directory name used inside the archive.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.prefix, self.normalized_name())
    }

    /// Same identity under another prefix.
    pub fn with_prefix(&self, prefix: BucketPrefix) -> Self {
        Self {
            prefix,
            ..self.clone()
        }
    }

    /// Lock marker name for this bucket, relative to its index container.
    pub fn lock_name(&self) -> String {
        format!("{}.lock", self.normalized_name())
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

fn parse_number<T: FromStr>(raw: &str, field: &str, value: &str) -> Result<T, BucketNameError> {
    value
        .parse::<T>()
        .map_err(|_| BucketNameError::malformed(raw, format!("{field} `{value}` is not a number")))
}
