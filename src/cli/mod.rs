//! Command-line interface
//!
//! Provides CLI commands for the market collector.

pub mod db;
pub mod run;

use clap::{Parser, Subcommand};

/// Market Collector CLI
#[derive(Parser)]
#[command(name = "market-collector")]
#[command(about = "Incremental OHLC market data collector")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Execute one collection run over the configured grid
    Run(run::RunArgs),
    /// Watermark database operations
    #[command(subcommand)]
    Db(db::DbCommands),
}
