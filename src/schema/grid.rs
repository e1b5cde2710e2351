//! Instrument/resolution grid
//!
//! The cross-product of configured instruments and resolutions defines one
//! run's unit of work. Cells exist only for the run's duration; their
//! enumeration order is fixed (instruments order x resolutions order) so
//! runs are deterministic.

use serde::{Deserialize, Serialize};

use super::SeriesKey;

/// How an instrument is fetched from its upstream source.
///
/// One sum type over source kinds with a uniform fetch capability, rather
/// than per-source column manipulation downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Kraken public OHLC API
    Kraken {
        /// Request pair identifier (e.g. "XBTUSD")
        pair: String,
        /// Key under `result` in the response body (e.g. "XXBTZUSD")
        result_key: String,
    },
    /// Yahoo Finance chart API
    Yahoo {
        /// Chart ticker (e.g. "JPY=X")
        ticker: String,
    },
}

impl SourceSpec {
    /// Source kind name, for logs and routing errors.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceSpec::Kraken { .. } => "kraken",
            SourceSpec::Yahoo { .. } => "yahoo",
        }
    }
}

/// One configured instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Canonical instrument identifier (e.g. "BTCUSD"); names sink
    /// partitions and watermark keys
    pub id: String,
    /// Upstream fetch specification
    pub source: SourceSpec,
}

/// One configured bar resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Resolution name (e.g. "1H"); names sink files and watermark keys
    pub name: String,
    /// Bar period in minutes
    pub minutes: u32,
}

impl Resolution {
    pub fn new(name: impl Into<String>, minutes: u32) -> Self {
        Self {
            name: name.into(),
            minutes,
        }
    }
}

/// One (instrument, resolution) unit of ingestion work within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub instrument: Instrument,
    pub resolution: Resolution,
}

impl GridCell {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(&self.instrument.id, &self.resolution.name)
    }
}

/// Enumerate the full grid in a fixed, deterministic order.
pub fn enumerate_grid(instruments: &[Instrument], resolutions: &[Resolution]) -> Vec<GridCell> {
    let mut cells = Vec::with_capacity(instruments.len() * resolutions.len());
    for instrument in instruments {
        for resolution in resolutions {
            cells.push(GridCell {
                instrument: instrument.clone(),
                resolution: resolution.clone(),
            });
        }
    }
    cells
}
