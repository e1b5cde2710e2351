//! Durable storage contracts
//!
//! Two independent boundaries: the watermark table (append-only rows
//! restored to one-per-key by compaction) and the bar sink (canonical CSV
//! partitions addressed by instrument, run bucket, and resolution).

pub mod sink;
pub mod watermark;

pub use sink::{FsSink, Sink, SinkError, SinkResult};
pub use watermark::{SqliteWatermarkStore, StoreError, StoreResult, Watermark, WatermarkStore};
