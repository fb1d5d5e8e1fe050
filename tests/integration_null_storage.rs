use anyhow::Result;
use clap::Parser;
use sbk_bench::{cli::Args, results::ResultsWriter, BenchmarkConfig, BenchmarkRunner};

/// Writers and readers against the Null driver, fixed record count.
///
/// Every worker completes its records, so the totals are exact.
#[tokio::test]
async fn null_writers_and_readers_fixed_count() -> Result<()> {
    let args = Args::parse_from(["sbk", "-w", "2", "-r", "2", "-n", "500", "-s", "64"]);
    let config = BenchmarkConfig::from_args(&args)?;
    let runner = BenchmarkRunner::new(config);

    let outcome = runner.run().await?;
    assert_eq!(outcome.driver, "Null");

    let writing = outcome.writing.expect("writer totals");
    assert_eq!(writing.total_records, 1000);
    assert_eq!(writing.total_bytes, 1000 * 64);
    assert_eq!(writing.invalid_latency_records, 0);
    assert_eq!(writing.percentiles.len(), 8);

    let reading = outcome.reading.expect("reader totals");
    assert_eq!(reading.total_records, 1000);
    Ok(())
}

/// A short time-bounded run with spilling enabled and a zero map budget.
///
/// The spill directory must be empty once the run has finished.
#[tokio::test]
async fn null_time_bounded_with_spill() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let spill_dir = dir.path().to_string_lossy().to_string();
    let args = Args::parse_from([
        "sbk",
        "-t",
        "300ms",
        "--interval",
        "50ms",
        "--time-unit",
        "ns",
        "--max-window-latency",
        "1000000",
        "--max-latency",
        "100000000",
        "--max-map-size-mb",
        "0",
        "--csv",
        "--spill-dir",
        &spill_dir,
        "-D",
        "n=100",
    ]);
    let config = BenchmarkConfig::from_args(&args)?;
    assert_eq!(config.recorder.spill_dir.as_deref(), Some(dir.path()));

    let outcome = BenchmarkRunner::new(config).run().await?;
    let writing = outcome.writing.expect("writer totals");
    assert!(writing.total_records > 0);
    assert_eq!(
        writing.total_records,
        writing.valid_latency_records
            + writing.higher_latency_discard_records
            + writing.lower_latency_discard_records
            + writing.invalid_latency_records
    );
    assert!(outcome.reading.is_none());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

/// Unknown driver options fail before any worker starts.
#[tokio::test]
async fn null_rejects_unknown_option() -> Result<()> {
    let args = Args::parse_from(["sbk", "-D", "bogus=1"]);
    let config = BenchmarkConfig::from_args(&args)?;
    assert!(BenchmarkRunner::new(config).run().await.is_err());
    Ok(())
}

/// Final totals can be written as JSON.
#[tokio::test]
async fn null_results_json() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.json");
    let args = Args::parse_from(["sbk", "-n", "100"]);
    let config = BenchmarkConfig::from_args(&args)?;
    let outcome = BenchmarkRunner::new(config.clone()).run().await?;

    ResultsWriter::new(&path).write(&config, &outcome)?;
    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(value["results"]["writing"]["total_records"], 100);
    Ok(())
}
