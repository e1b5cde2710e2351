//! End-to-end collector run scenarios over a scripted source, an in-memory
//! watermark store, and a real filesystem sink.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use market_collector::collector::Collector;
use market_collector::config::WritePolicy;
use market_collector::provider::MockAdapter;
use market_collector::report::{FailureReport, FailureReporter};
use market_collector::schema::{
    enumerate_grid, CanonicalBar, Instrument, RawBar, Resolution, SeriesKey, SourceSpec,
};
use market_collector::storage::{
    FsSink, Sink, SinkError, SinkResult, SqliteWatermarkStore, StoreError, StoreResult, Watermark,
    WatermarkStore,
};

const BUCKET: &str = "20260101_00h";

fn bar(unix_time: i64) -> RawBar {
    RawBar {
        unix_time,
        open: 1.0,
        high: 2.0,
        low: 0.5,
        close: 1.5,
        volume: 10.0,
        quote_volume: None,
    }
}

fn kraken(id: &str) -> Instrument {
    Instrument {
        id: id.to_string(),
        source: SourceSpec::Kraken {
            pair: id.to_string(),
            result_key: id.to_string(),
        },
    }
}

/// Reporter that records every report it receives.
#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<FailureReport>>,
}

impl RecordingReporter {
    fn count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

#[async_trait]
impl FailureReporter for RecordingReporter {
    async fn report(&self, report: &FailureReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Sink whose every write fails, as a full disk or revoked mount would.
struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn write(
        &self,
        _series: &SeriesKey,
        _run_bucket: &str,
        _bars: &[CanonicalBar],
    ) -> SinkResult<usize> {
        Err(SinkError::Io {
            path: PathBuf::from("unwritable/1H.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only sink"),
        })
    }
}

/// Store that can be made to fail at the flush or compaction step while
/// delegating everything else to a real store.
struct FlakyStore {
    inner: Arc<SqliteWatermarkStore>,
    fail_append: bool,
    fail_compact: bool,
}

#[async_trait]
impl WatermarkStore for FlakyStore {
    async fn load_all(&self) -> StoreResult<Vec<Watermark>> {
        self.inner.load_all().await
    }

    async fn append(&self, rows: &[Watermark]) -> StoreResult<()> {
        if self.fail_append {
            return Err(StoreError::Configuration("append unavailable".to_string()));
        }
        self.inner.append(rows).await
    }

    async fn compact(&self) -> StoreResult<()> {
        if self.fail_compact {
            return Err(StoreError::Configuration("compact unavailable".to_string()));
        }
        self.inner.compact().await
    }
}

struct Harness {
    adapter: Arc<MockAdapter>,
    store: Arc<SqliteWatermarkStore>,
    reporter: Arc<RecordingReporter>,
    collector: Collector,
    dir: TempDir,
}

async fn harness(instruments: &[Instrument], abort_on_cell_failure: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let adapter = Arc::new(MockAdapter::new());
    let store = Arc::new(
        SqliteWatermarkStore::connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    let reporter = Arc::new(RecordingReporter::default());
    let sink = Arc::new(FsSink::new(dir.path(), "crypto", WritePolicy::Overwrite));

    let grid = enumerate_grid(instruments, &[Resolution::new("1H", 60)]);
    let collector = Collector::new(
        adapter.clone(),
        sink,
        store.clone(),
        reporter.clone(),
        grid,
        abort_on_cell_failure,
    );

    Harness {
        adapter,
        store,
        reporter,
        collector,
        dir,
    }
}

async fn watermark_of(store: &SqliteWatermarkStore, table_name: &str) -> Option<i64> {
    store
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .find(|w| w.table_name == table_name)
        .map(|w| w.unix_time)
}

#[tokio::test]
async fn first_run_trims_trailing_bar_and_sets_watermark() {
    let h = harness(&[kraken("BTCUSD")], true).await;
    h.adapter
        .script("BTCUSD_1H", vec![bar(100), bar(200), bar(300), bar(400)]);

    let report = h.collector.execute(BUCKET).await.unwrap();

    assert_eq!(report.cells_written, 1);
    assert_eq!(report.rows_written, 3);
    assert_eq!(watermark_of(&h.store, "BTCUSD_1H").await, Some(300));

    // Fresh series starts from 0
    assert_eq!(h.adapter.calls("BTCUSD_1H"), vec![0]);

    let path = h.dir.path().join("crypto/BTCUSD").join(BUCKET).join("1H.csv");
    let content = fs::read_to_string(path).unwrap();
    assert!(content.starts_with(
        "UNIX_TIME,OPEN_PRICE,HIGH_PRICE,LOW_PRICE,CLOSE_PRICE,VOLUME,QUOTE_VOLUME,CLOSE_TIME"
    ));
    // Header plus the three surviving rows; 400 was the trailing bar.
    assert_eq!(content.lines().count(), 4);
    assert!(!content.contains("\n400,"));
}

#[tokio::test]
async fn second_run_resumes_from_watermark() {
    let h = harness(&[kraken("BTCUSD")], true).await;
    h.adapter
        .script("BTCUSD_1H", vec![bar(100), bar(200), bar(300), bar(400)]);
    h.adapter.script("BTCUSD_1H", vec![bar(400), bar(500)]);

    h.collector.execute(BUCKET).await.unwrap();
    let report = h.collector.execute("20260101_01h").await.unwrap();

    assert_eq!(h.adapter.calls("BTCUSD_1H"), vec![0, 300]);
    assert_eq!(report.rows_written, 1);
    assert_eq!(watermark_of(&h.store, "BTCUSD_1H").await, Some(400));
}

#[tokio::test]
async fn run_without_new_data_is_idempotent() {
    let h = harness(&[kraken("BTCUSD")], true).await;
    h.adapter
        .script("BTCUSD_1H", vec![bar(100), bar(200), bar(300), bar(400)]);
    // Second run: nothing scripted, the adapter returns an empty batch.

    h.collector.execute(BUCKET).await.unwrap();
    let report = h.collector.execute("20260101_01h").await.unwrap();

    assert_eq!(report.cells_written, 0);
    assert_eq!(report.cells_skipped, 1);
    // The unchanged watermark is still flushed and survives compaction.
    assert_eq!(watermark_of(&h.store, "BTCUSD_1H").await, Some(300));
    let rows = h.store.load_all().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn short_batch_is_skipped_without_advancing() {
    let h = harness(&[kraken("BTCUSD")], true).await;
    h.adapter.script("BTCUSD_1H", vec![bar(100)]);

    let report = h.collector.execute(BUCKET).await.unwrap();

    assert_eq!(report.cells_skipped, 1);
    assert_eq!(watermark_of(&h.store, "BTCUSD_1H").await, None);
    assert!(!h.dir.path().join("crypto/BTCUSD").exists());
}

#[tokio::test]
async fn stale_echo_fails_the_run() {
    let h = harness(&[kraken("BTCUSD")], true).await;
    h.adapter
        .script("BTCUSD_1H", vec![bar(100), bar(200), bar(300), bar(400)]);
    // The source echoes the watermark bar despite the exclusive bound.
    h.adapter.script("BTCUSD_1H", vec![bar(300), bar(400), bar(500)]);

    h.collector.execute(BUCKET).await.unwrap();
    let err = h.collector.execute("20260101_01h").await.unwrap_err();

    assert!(err.to_string().contains("not after watermark"));
    // The failed run flushed nothing; the first run's watermark stands.
    assert_eq!(watermark_of(&h.store, "BTCUSD_1H").await, Some(300));
}

#[tokio::test]
async fn abort_policy_flushes_nothing_on_failure() {
    let h = harness(&[kraken("BTCUSD"), kraken("ETHBTC")], true).await;
    h.adapter
        .script("BTCUSD_1H", vec![bar(100), bar(200), bar(300)]);
    h.adapter.fail("ETHBTC_1H");

    let err = h.collector.execute(BUCKET).await;

    assert!(err.is_err());
    // BTCUSD succeeded before the failure, but nothing was flushed.
    assert!(h.store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn isolate_policy_keeps_healthy_cells() {
    let h = harness(&[kraken("BTCUSD"), kraken("ETHBTC")], false).await;
    h.adapter.fail("BTCUSD_1H");
    h.adapter
        .script("ETHBTC_1H", vec![bar(100), bar(200), bar(300)]);

    let report = h.collector.execute(BUCKET).await.unwrap();

    assert_eq!(report.cell_failures.len(), 1);
    assert_eq!(report.cells_written, 1);
    assert_eq!(watermark_of(&h.store, "ETHBTC_1H").await, Some(200));
    assert_eq!(watermark_of(&h.store, "BTCUSD_1H").await, None);
}

#[tokio::test]
async fn run_reports_failure_once() {
    let h = harness(&[kraken("BTCUSD")], true).await;
    h.adapter.fail("BTCUSD_1H");

    let err = h.collector.run().await;

    assert!(err.is_err());
    assert_eq!(h.reporter.count(), 1);
}

#[tokio::test]
async fn sink_failure_aborts_without_flush() {
    let adapter = Arc::new(MockAdapter::new());
    adapter.script("BTCUSD_1H", vec![bar(100), bar(200), bar(300)]);
    let store = Arc::new(
        SqliteWatermarkStore::connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    let reporter = Arc::new(RecordingReporter::default());
    let grid = enumerate_grid(&[kraken("BTCUSD")], &[Resolution::new("1H", 60)]);
    let collector = Collector::new(
        adapter,
        Arc::new(FailingSink),
        store.clone(),
        reporter.clone(),
        grid,
        true,
    );

    let err = collector.run().await.unwrap_err();

    assert!(err.to_string().contains("sink write failed"));
    assert!(store.load_all().await.unwrap().is_empty());
    assert_eq!(reporter.count(), 1);
}

#[tokio::test]
async fn store_failure_during_flush_keeps_prior_watermarks() {
    let dir = TempDir::new().unwrap();
    let adapter = Arc::new(MockAdapter::new());
    adapter.script("BTCUSD_1H", vec![bar(400), bar(500), bar(600)]);
    let inner = Arc::new(
        SqliteWatermarkStore::connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    inner
        .append(&[Watermark::new("BTCUSD_1H", 300)])
        .await
        .unwrap();
    let reporter = Arc::new(RecordingReporter::default());
    let sink = Arc::new(FsSink::new(dir.path(), "crypto", WritePolicy::Overwrite));
    let grid = enumerate_grid(&[kraken("BTCUSD")], &[Resolution::new("1H", 60)]);
    let collector = Collector::new(
        adapter.clone(),
        sink,
        Arc::new(FlakyStore {
            inner: inner.clone(),
            fail_append: true,
            fail_compact: false,
        }),
        reporter.clone(),
        grid,
        true,
    );

    let err = collector.run().await.unwrap_err();

    assert!(err.to_string().contains("watermark store error"));
    assert_eq!(reporter.count(), 1);
    // The cell was fetched from the prior watermark, but the failed flush
    // left the table exactly as it was.
    assert_eq!(adapter.calls("BTCUSD_1H"), vec![300]);
    assert_eq!(
        inner.load_all().await.unwrap(),
        vec![Watermark::new("BTCUSD_1H", 300)]
    );
}

#[tokio::test]
async fn store_failure_during_compact_retains_sunk_data() {
    let dir = TempDir::new().unwrap();
    let adapter = Arc::new(MockAdapter::new());
    adapter.script("BTCUSD_1H", vec![bar(100), bar(200), bar(300)]);
    let inner = Arc::new(
        SqliteWatermarkStore::connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    let reporter = Arc::new(RecordingReporter::default());
    let sink = Arc::new(FsSink::new(dir.path(), "crypto", WritePolicy::Overwrite));
    let grid = enumerate_grid(&[kraken("BTCUSD")], &[Resolution::new("1H", 60)]);
    let collector = Collector::new(
        adapter,
        sink,
        Arc::new(FlakyStore {
            inner: inner.clone(),
            fail_append: false,
            fail_compact: true,
        }),
        reporter.clone(),
        grid,
        true,
    );

    let err = collector.execute(BUCKET).await;

    assert!(err.is_err());
    // Appends landed before compaction failed: duplicates are tolerated by
    // design and a later compaction collapses them. The written partition
    // is retained.
    assert_eq!(
        inner.load_all().await.unwrap(),
        vec![Watermark::new("BTCUSD_1H", 200)]
    );
    assert!(dir
        .path()
        .join("crypto/BTCUSD")
        .join(BUCKET)
        .join("1H.csv")
        .exists());
}

#[tokio::test]
async fn isolated_failures_reported_once_as_summary() {
    let h = harness(&[kraken("BTCUSD"), kraken("ETHBTC")], false).await;
    h.adapter.fail("BTCUSD_1H");
    h.adapter
        .script("ETHBTC_1H", vec![bar(100), bar(200), bar(300)]);

    let report = h.collector.run().await.unwrap();

    assert_eq!(report.cell_failures.len(), 1);
    assert_eq!(h.reporter.count(), 1);
}

#[tokio::test]
async fn watermarks_are_monotonic_across_runs() {
    let h = harness(&[kraken("BTCUSD")], true).await;
    h.adapter
        .script("BTCUSD_1H", vec![bar(100), bar(200), bar(300)]);
    h.adapter.script("BTCUSD_1H", vec![bar(300), bar(400), bar(500)]);
    h.adapter.script("BTCUSD_1H", vec![bar(500), bar(600)]);

    let mut previous = 0;
    for bucket in ["20260101_00h", "20260101_01h", "20260101_02h"] {
        h.collector.execute(bucket).await.unwrap();
        let current = watermark_of(&h.store, "BTCUSD_1H").await.unwrap();
        assert!(current >= previous);
        previous = current;
    }
    assert_eq!(previous, 500);
}

#[tokio::test]
async fn compaction_leaves_one_row_per_series() {
    let h = harness(&[kraken("BTCUSD"), kraken("ETHBTC")], true).await;
    h.adapter
        .script("BTCUSD_1H", vec![bar(100), bar(200), bar(300)]);
    h.adapter
        .script("ETHBTC_1H", vec![bar(10), bar(20), bar(30)]);
    h.adapter.script("BTCUSD_1H", vec![bar(300), bar(400), bar(500)]);
    h.adapter.script("ETHBTC_1H", vec![bar(30), bar(40), bar(50)]);

    h.collector.execute("20260101_00h").await.unwrap();
    h.collector.execute("20260101_01h").await.unwrap();

    let rows = h.store.load_all().await.unwrap();
    assert_eq!(rows.len(), 2);
}
