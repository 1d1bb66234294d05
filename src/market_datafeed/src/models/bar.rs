//! Canonical in-memory representation of a time-series bar (OHLCV).
//!
//! This struct is the standard output of every [`DataProvider`](crate::providers::DataProvider)
//! and the unit stored by the [`BarCache`](crate::datafeed::cache::BarCache).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single time-series bar (OHLCV) for a given timestamp.
///
/// `time` is a Unix epoch in milliseconds, which is what the charting widget consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time, milliseconds since the Unix epoch (UTC).
    pub time: i64,

    /// Opening price.
    pub open: f64,

    /// Highest price during the bar interval.
    pub high: f64,

    /// Lowest price during the bar interval.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Volume traded during the bar interval.
    pub volume: f64,
}

impl Bar {
    /// The bar's `time` rounded to the nearest whole second, still in milliseconds.
    pub fn normalized_time(&self) -> i64 {
        normalize_millis(self.time)
    }

    /// Copy of this bar with its timestamp canonicalized.
    pub fn normalized(&self) -> Self {
        Self {
            time: self.normalized_time(),
            ..*self
        }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.time)
    }
}

/// Round a millisecond timestamp to the nearest whole second (half rounds up).
pub fn normalize_millis(ms: i64) -> i64 {
    (ms + 500).div_euclid(1000) * 1000
}
