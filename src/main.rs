//! # SBK - Main Entry Point
//!
//! Runs one storage benchmark and reports throughput and latency
//! percentiles for every reporting interval and for the whole run.
//!
//! ## Steps
//!
//! 1. **Initialize logging**: `tracing` with the SBK console formatter
//! 2. **Parse arguments**: clap derive API, then validation into a
//!    [`BenchmarkConfig`]
//! 3. **Run**: workers feed the reporter tasks until the run ends
//! 4. **Write results**: optional JSON output of the final totals
//!
//! The log level can be controlled via `RUST_LOG`, e.g.
//! `RUST_LOG=debug sbk -w 4 -t 30s`.

use anyhow::Result;
use clap::Parser;
use sbk_bench::{
    benchmark::{BenchmarkConfig, BenchmarkRunner},
    cli::Args,
    logging::SbkFormatter,
    results::ResultsWriter,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .event_format(SbkFormatter)
        .init();

    let args = Args::parse();
    let config = BenchmarkConfig::from_args(&args)?;
    info!("Configuration: {:?}", config);

    let runner = BenchmarkRunner::new(config.clone());
    let outcome = runner.run().await?;

    if let Some(output_file) = &args.output_file {
        ResultsWriter::new(output_file).write(&config, &outcome)?;
    }

    info!("{} benchmark completed", outcome.driver);
    Ok(())
}
