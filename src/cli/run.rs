//! Run command - execute one collection run

use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use tracing::info;

use crate::collector::Collector;
use crate::config::Settings;
use crate::provider::SourceRouter;
use crate::report::{FailureReporter, LogReporter, WebhookReporter};
use crate::schema::enumerate_grid;
use crate::storage::{FsSink, SqliteWatermarkStore};

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Continue past failed cells instead of aborting the run
    #[arg(long)]
    pub isolate_failures: bool,

    /// Restrict the run to one instrument id (e.g. BTCUSD)
    #[arg(long, short)]
    pub instrument: Option<String>,
}

/// Execute the run command
pub async fn execute(args: RunArgs) -> Result<()> {
    let settings = Settings::load().unwrap_or_else(|_| Settings::default_settings());

    let instruments: Vec<_> = match &args.instrument {
        Some(id) => settings
            .instruments
            .iter()
            .filter(|i| &i.id == id)
            .cloned()
            .collect(),
        None => settings.instruments.clone(),
    };
    if instruments.is_empty() {
        anyhow::bail!("no configured instrument matches the filter");
    }

    let grid = enumerate_grid(&instruments, &settings.resolutions);
    info!(cells = grid.len(), "grid assembled");

    let adapter = Arc::new(SourceRouter::from_settings(&settings.source)?);
    let sink = Arc::new(FsSink::new(
        &settings.sink.root,
        &settings.dataset,
        settings.sink.policy,
    ));
    let store = Arc::new(SqliteWatermarkStore::connect(&settings.store.url).await?);
    let reporter: Arc<dyn FailureReporter> = match &settings.report.webhook_url {
        Some(url) => Arc::new(WebhookReporter::new(url)?),
        None => Arc::new(LogReporter),
    };

    let abort = settings.collector.abort_on_cell_failure && !args.isolate_failures;
    let collector = Collector::new(adapter, sink, store, reporter, grid, abort);

    let report = collector.run().await?;

    println!("Run {} complete", report.run_bucket);
    println!(
        "  cells: {} written, {} skipped, {} failed (of {})",
        report.cells_written,
        report.cells_skipped,
        report.cell_failures.len(),
        report.cells_total
    );
    println!("  rows written: {}", report.rows_written);
    println!("  watermarks flushed: {}", report.watermarks);
    for failure in &report.cell_failures {
        println!("  failed: {}", failure);
    }

    Ok(())
}
