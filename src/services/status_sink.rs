//! Destinations for per-action status records.

use crate::models::status::StatusRecord;
use std::sync::Mutex;
use tracing::info;

/// Receives one [`StatusRecord`] per major action of a flow.
pub trait StatusSink: Send + Sync {
    fn emit(&self, record: &StatusRecord);
}

/// Renders records as `key=value, key=value` lines at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn emit(&self, record: &StatusRecord) {
        info!(target: "frozen_archive::status", "{}", render(record));
    }
}

pub fn render(record: &StatusRecord) -> String {
    record
        .fields()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Keeps every record in memory. Used by tests and by callers that want to
/// inspect the outcome of a run.
#[derive(Debug, Default)]
pub struct CollectingStatusSink {
    records: Mutex<Vec<StatusRecord>>,
}

impl CollectingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<StatusRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Values of the `status` field, in emission order.
    pub fn statuses(&self) -> Vec<String> {
        self.records()
            .iter()
            .filter_map(|r| r.status().map(str::to_string))
            .collect()
    }
}

impl StatusSink for CollectingStatusSink {
    fn emit(&self, record: &StatusRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
