//! Canonical bar schema and series identity
//!
//! `RawBar` is what an adapter hands back: numeric fields already coerced,
//! ordering already ascending. `CanonicalBar` is the row shape persisted by
//! every sink; its serde names are the CSV column headers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one logical time series: an instrument at one resolution.
///
/// Renders as `{instrument}_{resolution}` (e.g. `BTCUSD_1H`), which is also
/// the join key against the watermark table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    /// Instrument identifier (e.g. "BTCUSD")
    pub instrument: String,
    /// Resolution name (e.g. "1H")
    pub resolution: String,
}

impl SeriesKey {
    pub fn new(instrument: impl Into<String>, resolution: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            resolution: resolution.into(),
        }
    }

    /// Watermark table key for this series.
    pub fn table_name(&self) -> String {
        format!("{}_{}", self.instrument, self.resolution)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.instrument, self.resolution)
    }
}

/// One source-native bar, after field coercion but before trimming.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    /// Bar timestamp, unix seconds
    pub unix_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Quote-currency volume; most sources do not supply it
    pub quote_volume: Option<f64>,
}

/// Ordered batch returned by one adapter call.
pub type FetchBatch = Vec<RawBar>;

/// Canonical OHLC row, as persisted by every sink.
///
/// Serde field names double as the CSV header, matching the layout the
/// downstream table loader expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBar {
    #[serde(rename = "UNIX_TIME")]
    pub unix_time: i64,
    #[serde(rename = "OPEN_PRICE")]
    pub open: f64,
    #[serde(rename = "HIGH_PRICE")]
    pub high: f64,
    #[serde(rename = "LOW_PRICE")]
    pub low: f64,
    #[serde(rename = "CLOSE_PRICE")]
    pub close: f64,
    #[serde(rename = "VOLUME")]
    pub volume: f64,
    #[serde(rename = "QUOTE_VOLUME")]
    pub quote_volume: f64,
    #[serde(rename = "CLOSE_TIME")]
    pub close_time: DateTime<Utc>,
}

impl CanonicalBar {
    /// Normalize one raw bar: absent quote volume becomes 0, `close_time`
    /// is derived from `unix_time` at second precision.
    pub fn from_raw(raw: &RawBar) -> Self {
        Self {
            unix_time: raw.unix_time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            quote_volume: raw.quote_volume.unwrap_or(0.0),
            close_time: DateTime::from_timestamp(raw.unix_time, 0).unwrap_or_default(),
        }
    }
}
