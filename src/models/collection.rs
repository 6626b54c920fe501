//! A set of buckets belonging to one index, with time-based selection.

use crate::models::bucket::{BucketName, BucketNameError};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

const SECONDS_PER_DAY: i64 = 86_400;

/// Buckets of a single index keyed by their archive directory name.
///
/// Results of the filters carry no ordering guarantee.
#[derive(Debug, Clone, Default)]
pub struct BucketCollection {
    index: String,
    buckets: BTreeMap<String, BucketName>,
}

impl BucketCollection {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            buckets: BTreeMap::new(),
        }
    }

    /// Build a collection from raw directory names, failing on the first
    /// malformed one.
    pub fn from_names<I, S>(
        index: impl Into<String>,
        names: I,
        local_guid: Option<&str>,
    ) -> Result<Self, BucketNameError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut collection = Self::new(index);
        for name in names {
            collection.insert(BucketName::parse(name.as_ref(), local_guid)?);
        }
        Ok(collection)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn insert(&mut self, bucket: BucketName) {
        self.buckets.insert(bucket.dir_name(), bucket);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BucketName> {
        self.buckets.values()
    }

    /// Buckets whose `[start, end]` overlaps `[start, end]` of the query.
    ///
    /// A bucket is selected when its start or its end falls inside the query
    /// range (both edges inclusive), or when it encloses the whole range.
    pub fn filter_by_range(&self, start: i64, end: i64) -> BucketCollection {
        self.filtered(|b| {
            let start_inside = b.start >= start && b.start <= end;
            let end_inside = b.end >= start && b.end <= end;
            let encloses = b.start <= start && b.end >= end;
            start_inside || end_inside || encloses
        })
    }

    /// Buckets whose end lies at or before `now - days`.
    ///
    /// A retention reaching past the earliest representable date selects
    /// nothing.
    pub fn filter_older_than(&self, now: DateTime<Utc>, days: u32) -> BucketCollection {
        let cutoff = now
            .checked_sub_signed(Duration::seconds(i64::from(days) * SECONDS_PER_DAY))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .timestamp();
        self.filtered(|b| b.end <= cutoff)
    }

    /// Earliest bucket start, `None` when empty.
    pub fn earliest(&self) -> Option<i64> {
        self.iter().map(|b| b.start).min()
    }

    /// Latest bucket end, `None` when empty.
    pub fn latest(&self) -> Option<i64> {
        self.iter().map(|b| b.end).max()
    }

    fn filtered(&self, keep: impl Fn(&BucketName) -> bool) -> BucketCollection {
        BucketCollection {
            index: self.index.clone(),
            buckets: self
                .buckets
                .iter()
                .filter(|(_, b)| keep(b))
                .map(|(k, b)| (k.clone(), b.clone()))
                .collect(),
        }
    }
}

impl IntoIterator for BucketCollection {
    type Item = BucketName;
    type IntoIter = std::collections::btree_map::IntoValues<String, BucketName>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_values()
    }
}
