//! Day-granular restore windows.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

/// Inclusive `[start, end]` window in Unix epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TimeRangeError(String);

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Result<Self, TimeRangeError> {
        if end < start {
            return Err(TimeRangeError(format!(
                "range end {end} is before range start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Window from the first second of `start_day` up to and including the
    /// first second after `end_day` (UTC).
    ///
    /// Days are given as `DDMMYYYY` or `YYYY-MM-DD`.
    pub fn from_days(start_day: &str, end_day: &str) -> Result<Self, TimeRangeError> {
        let start = parse_day(start_day)?
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let end = parse_day(end_day)?
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| TimeRangeError(format!("invalid end day `{end_day}`")))?
            .and_utc()
            .timestamp()
            + 1;
        Self::new(start, end)
    }
}

fn parse_day(value: &str) -> Result<NaiveDate, TimeRangeError> {
    NaiveDate::parse_from_str(value, "%d%m%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| TimeRangeError(format!("`{value}` is not a DDMMYYYY or YYYY-MM-DD date")))
}
