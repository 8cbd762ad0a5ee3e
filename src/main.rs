//! admit-bench CLI
//!
//! Command-line entry point for running the admission benchmarks.

use anyhow::Result;
use clap::Parser;

use admit_bench::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Run the benchmark
    cli.run().await?;

    Ok(())
}
