//! Watermark database commands

use anyhow::Result;
use clap::Subcommand;

use crate::config::Settings;
use crate::storage::{SqliteWatermarkStore, WatermarkStore};

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// List the current watermark snapshot
    Watermarks,
    /// Compact the watermark table to one row per series
    Compact,
}

/// Execute a database subcommand
pub async fn execute(command: DbCommands) -> Result<()> {
    let settings = Settings::load().unwrap_or_else(|_| Settings::default_settings());
    let store = SqliteWatermarkStore::connect(&settings.store.url).await?;

    match command {
        DbCommands::Watermarks => {
            let rows = store.load_all().await?;
            if rows.is_empty() {
                println!("No watermarks recorded");
                return Ok(());
            }
            println!("{:<24} {:>12}", "SERIES", "UNIX_TIME");
            for row in rows {
                println!("{:<24} {:>12}", row.table_name, row.unix_time);
            }
        }
        DbCommands::Compact => {
            store.compact().await?;
            println!("Watermark table compacted");
        }
    }

    Ok(())
}
