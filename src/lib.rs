//! # Market Collector
//!
//! Incremental time-series ingestion engine for OHLC market data.
//!
//! ## Features
//!
//! - **Incremental fetch**: a per-series watermark table records the last
//!   persisted bar; every run fetches only what is newer.
//! - **Trailing-bar trimming**: the still-forming last bar from a source is
//!   never persisted.
//! - **At-least-once watermarks**: watermark rows are appended in bulk and
//!   physically deduplicated by a compaction step, so a failed run never
//!   advances a watermark past data that was not durably written.
//!
//! ## Architecture
//!
//! Source adapters (Kraken, Yahoo) normalize provider payloads to a common
//! bar schema. A collector run iterates the configured
//! (instrument x resolution) grid, writes canonical CSV partitions through
//! the sink, and reconciles the watermark store at the end of the run.

pub mod cli;
pub mod collector;
pub mod config;
pub mod provider;
pub mod report;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use collector::{Collector, CollectorError, RunReport};
pub use config::Settings;
pub use provider::{FetchBatch, SourceAdapter, SourceError, SourceResult};
pub use schema::{CanonicalBar, GridCell, Instrument, RawBar, Resolution, SeriesKey, SourceSpec};
pub use storage::{Sink, SinkError, StoreError, Watermark, WatermarkStore};
