//! Canonical data types
//!
//! Provider-specific payloads are normalized to these types before anything
//! is written to a sink or counted against a watermark.

pub mod bar;
pub mod grid;
pub mod normalize;

pub use bar::{CanonicalBar, FetchBatch, RawBar, SeriesKey};
pub use grid::{enumerate_grid, GridCell, Instrument, Resolution, SourceSpec};
pub use normalize::{normalize_batch, NormalizeError, NormalizedBatch};
