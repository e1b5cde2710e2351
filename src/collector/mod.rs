//! Collector run orchestration
//!
//! One run walks the (instrument x resolution) grid sequentially: load the
//! watermark snapshot, fetch each cell past its watermark, trim and write,
//! then flush the full watermark map and compact. Watermarks are folded into
//! an explicit accumulator that starts from the loaded snapshot; the durable
//! table is only touched in the flush phase, so a run that dies mid-grid
//! leaves every watermark where the previous run put it.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::provider::{SourceAdapter, SourceError};
use crate::report::{FailureReport, FailureReporter};
use crate::schema::normalize::{normalize_batch, NormalizeError};
use crate::schema::GridCell;
use crate::storage::{Sink, SinkError, StoreError, Watermark, WatermarkStore};

/// Collector run errors
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("{series}: fetch failed: {source}")]
    Adapter {
        series: String,
        #[source]
        source: SourceError,
    },

    #[error("{source}")]
    Normalize {
        series: String,
        #[source]
        source: NormalizeError,
    },

    #[error("{series}: sink write failed: {source}")]
    Sink {
        series: String,
        #[source]
        source: SinkError,
    },

    #[error("watermark store error: {0}")]
    Store(#[from] StoreError),
}

/// Phases of one collector run, in order. Logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    LoadingWatermarks,
    Iterating,
    Flushing,
    Compacting,
    Done,
}

impl RunPhase {
    fn as_str(&self) -> &'static str {
        match self {
            RunPhase::LoadingWatermarks => "loading_watermarks",
            RunPhase::Iterating => "iterating",
            RunPhase::Flushing => "flushing",
            RunPhase::Compacting => "compacting",
            RunPhase::Done => "done",
        }
    }
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Partition bucket all of this run's files landed under
    pub run_bucket: String,
    /// Grid cells visited
    pub cells_total: usize,
    /// Cells that produced a written partition
    pub cells_written: usize,
    /// Cells skipped for lack of usable data
    pub cells_skipped: usize,
    /// Rendered per-cell failures (only populated when cell failures are
    /// isolated instead of aborting the run)
    pub cell_failures: Vec<String>,
    /// Canonical rows written across all cells
    pub rows_written: usize,
    /// Watermark rows flushed at the end of the run
    pub watermarks: usize,
}

/// Partition bucket for a run starting at `now`: hour granularity, UTC.
pub fn run_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%Hh").to_string()
}

/// Fold a watermark snapshot into one entry per series, keeping the maximum
/// time. The snapshot may hold duplicates between compactions.
fn fold_snapshot(rows: Vec<Watermark>) -> BTreeMap<String, i64> {
    let mut map = BTreeMap::new();
    for row in rows {
        map.entry(row.table_name)
            .and_modify(|t: &mut i64| *t = (*t).max(row.unix_time))
            .or_insert(row.unix_time);
    }
    map
}

/// Orchestrates one ingestion run over a fixed grid.
pub struct Collector {
    adapter: Arc<dyn SourceAdapter>,
    sink: Arc<dyn Sink>,
    store: Arc<dyn WatermarkStore>,
    reporter: Arc<dyn FailureReporter>,
    grid: Vec<GridCell>,
    abort_on_cell_failure: bool,
    component: String,
}

impl Collector {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        sink: Arc<dyn Sink>,
        store: Arc<dyn WatermarkStore>,
        reporter: Arc<dyn FailureReporter>,
        grid: Vec<GridCell>,
        abort_on_cell_failure: bool,
    ) -> Self {
        Self {
            adapter,
            sink,
            store,
            reporter,
            grid,
            abort_on_cell_failure,
            component: "collector".to_string(),
        }
    }

    /// Execute one run, reporting a failure through the configured reporter
    /// before surfacing it.
    pub async fn run(&self) -> Result<RunReport, CollectorError> {
        let bucket = run_bucket(Utc::now());
        match self.execute(&bucket).await {
            Ok(report) => {
                info!(
                    run_bucket = %report.run_bucket,
                    cells_written = report.cells_written,
                    cells_skipped = report.cells_skipped,
                    cell_failures = report.cell_failures.len(),
                    rows_written = report.rows_written,
                    "run complete"
                );
                // Isolated cell failures do not fail the run, but they still
                // get surfaced through the reporter, once, as a summary.
                if !report.cell_failures.is_empty() {
                    self.reporter
                        .report(&FailureReport::new(
                            &self.component,
                            report.cell_failures.join("\n"),
                        ))
                        .await;
                }
                Ok(report)
            }
            Err(e) => {
                self.reporter
                    .report(&FailureReport::new(&self.component, e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// The run body, parameterized by bucket for deterministic tests.
    pub async fn execute(&self, bucket: &str) -> Result<RunReport, CollectorError> {
        info!(phase = RunPhase::LoadingWatermarks.as_str(), run_bucket = bucket, "run started");
        let snapshot = self.store.load_all().await?;
        let mut watermarks = fold_snapshot(snapshot);

        info!(phase = RunPhase::Iterating.as_str(), cells = self.grid.len(), "walking grid");
        let mut report = RunReport {
            run_bucket: bucket.to_string(),
            cells_total: self.grid.len(),
            cells_written: 0,
            cells_skipped: 0,
            cell_failures: Vec::new(),
            rows_written: 0,
            watermarks: 0,
        };

        for cell in &self.grid {
            let table_name = cell.series_key().table_name();
            let since = watermarks.get(&table_name).copied().unwrap_or(0);

            match self.collect_cell(cell, bucket, since).await {
                Ok(Some((max_unix_time, rows))) => {
                    watermarks.insert(table_name, max_unix_time);
                    report.cells_written += 1;
                    report.rows_written += rows;
                }
                Ok(None) => {
                    report.cells_skipped += 1;
                }
                Err(e) if self.abort_on_cell_failure => {
                    // All-or-nothing: nothing gets flushed, every watermark
                    // stays where the previous successful run left it.
                    return Err(e);
                }
                Err(e) => {
                    warn!(series = %table_name, "cell failed, continuing: {}", e);
                    report.cell_failures.push(e.to_string());
                }
            }
        }

        // Flush the entire map, changed or not. Rewriting an unchanged
        // watermark is harmless; compaction collapses the duplicates.
        info!(phase = RunPhase::Flushing.as_str(), rows = watermarks.len(), "flushing watermarks");
        let rows: Vec<Watermark> = watermarks
            .iter()
            .map(|(table_name, unix_time)| Watermark::new(table_name.clone(), *unix_time))
            .collect();
        self.store.append(&rows).await?;
        report.watermarks = rows.len();

        info!(phase = RunPhase::Compacting.as_str(), "compacting watermark table");
        self.store.compact().await?;

        info!(phase = RunPhase::Done.as_str(), "run body finished");
        Ok(report)
    }

    /// Fetch, trim, and persist one cell. Returns the new watermark and row
    /// count, or `None` when the cell had no usable data.
    async fn collect_cell(
        &self,
        cell: &GridCell,
        bucket: &str,
        since: i64,
    ) -> Result<Option<(i64, usize)>, CollectorError> {
        let series = cell.series_key();
        let table_name = series.table_name();

        let batch = self
            .adapter
            .fetch(cell, since)
            .await
            .map_err(|source| CollectorError::Adapter {
                series: table_name.clone(),
                source,
            })?;

        let normalized = normalize_batch(&series, batch, since).map_err(|source| {
            CollectorError::Normalize {
                series: table_name.clone(),
                source,
            }
        })?;

        let Some(normalized) = normalized else {
            info!(series = %table_name, since, "no usable data, cell skipped");
            return Ok(None);
        };

        let rows = self
            .sink
            .write(&series, bucket, &normalized.bars)
            .await
            .map_err(|source| CollectorError::Sink {
                series: table_name.clone(),
                source,
            })?;

        info!(
            series = %table_name,
            since,
            watermark = normalized.max_unix_time,
            rows,
            "cell written"
        );
        Ok(Some((normalized.max_unix_time, normalized.bars.len())))
    }
}
