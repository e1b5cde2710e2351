//! Normalization and trimming rules
//!
//! A fetch batch becomes sink-ready canonical rows here. The last element of
//! every batch is the current, still-forming period; its values change with
//! the wall clock, so it is dropped unconditionally. A batch shorter than 2
//! cannot be told apart from "only the unreliable trailing bar", so it is
//! treated as no usable data.

use thiserror::Error;

use super::{CanonicalBar, FetchBatch, SeriesKey};

/// Normalization failures. These indicate a source violating its contract,
/// not a transient condition.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// A bar at or before the watermark survived trimming. The fetch bound
    /// is exclusive; accepting this row would rewind the series.
    #[error("{series}: bar at {unix_time} not after watermark {since}")]
    StaleBar {
        series: String,
        unix_time: i64,
        since: i64,
    },

    /// Bar timestamps must be strictly increasing within a batch.
    #[error("{series}: bar at {unix_time} out of order (previous {previous})")]
    OutOfOrder {
        series: String,
        unix_time: i64,
        previous: i64,
    },
}

/// Result of normalizing one non-empty batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    /// Canonical rows, ascending by `unix_time`
    pub bars: Vec<CanonicalBar>,
    /// Candidate new watermark for the cell
    pub max_unix_time: i64,
}

/// Normalize and trim a fetch batch against the series watermark.
///
/// Returns `Ok(None)` when the batch holds no usable data (fewer than two
/// elements). Otherwise the trailing bar is dropped, the remainder is mapped
/// to the canonical schema, and the batch maximum becomes the candidate
/// watermark.
pub fn normalize_batch(
    series: &SeriesKey,
    batch: FetchBatch,
    since: i64,
) -> Result<Option<NormalizedBatch>, NormalizeError> {
    if batch.len() < 2 {
        return Ok(None);
    }

    let trimmed = &batch[..batch.len() - 1];

    let mut bars = Vec::with_capacity(trimmed.len());
    let mut previous: Option<i64> = None;
    for raw in trimmed {
        if raw.unix_time <= since {
            return Err(NormalizeError::StaleBar {
                series: series.table_name(),
                unix_time: raw.unix_time,
                since,
            });
        }
        if let Some(prev) = previous {
            if raw.unix_time <= prev {
                return Err(NormalizeError::OutOfOrder {
                    series: series.table_name(),
                    unix_time: raw.unix_time,
                    previous: prev,
                });
            }
        }
        previous = Some(raw.unix_time);
        bars.push(CanonicalBar::from_raw(raw));
    }

    // Ascending order was just verified, so the maximum is the last row.
    let max_unix_time = bars.last().map(|b| b.unix_time).unwrap_or(since);

    Ok(Some(NormalizedBatch { bars, max_unix_time }))
}
