//! Market Collector CLI
//!
//! Provides commands for:
//! - `run`: Execute one collection run over the configured grid
//! - `db`: Watermark database operations

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_collector::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("market_collector=info".parse()?))
        .init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Run(args) => {
            market_collector::cli::run::execute(args).await?;
        }
        Commands::Db(cmd) => {
            market_collector::cli::db::execute(cmd).await?;
        }
    }

    Ok(())
}
