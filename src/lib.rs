//! # SBK Latency Core
//!
//! The latency-measurement core of a storage benchmark kit. Concurrent
//! readers and writers produce a high-rate stream of
//! `(timestamp, bytes, events, latency)` samples; this library turns that
//! stream into periodic and final throughput and percentile reports under a
//! fixed memory budget.
//!
//! ## Architecture Overview
//!
//! - `recorder`: windowed aggregation, dense and sparse histograms, the
//!   window + cumulative composites and the disk-spilling variant
//! - `report`: report values and the output sinks that receive them
//! - `storage`: the storage driver capability set and the `Null` driver
//! - `benchmark`: the runner that drives workers and the single-owner
//!   reporter task
//! - `time`: latency units and the clock abstraction
//! - `cli`, `logging`, `results`, `utils`: the binary's ambient plumbing
//!
//! ## Usage Example
//!
//! ```rust
//! use sbk_bench::recorder::{LatencyWindowConfig, PeriodicLatencyRecorder, RecorderConfig};
//! use sbk_bench::report::ReportCollector;
//! use sbk_bench::time::TimeUnit;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let window = LatencyWindowConfig::new(0, 1000, TimeUnit::Ms);
//! let config = RecorderConfig::new(window.clone(), window);
//! let totals = ReportCollector::new();
//! let mut recorder = config.build(Arc::new(ReportCollector::new()), Arc::new(totals.clone()))?;
//!
//! recorder.start(0);
//! for latency in 0..100 {
//!     recorder.record(latency, 1024, 1, latency);
//! }
//! recorder.print_total(100);
//!
//! assert_eq!(totals.last().unwrap().total_records, 100);
//! # Ok(())
//! # }
//! ```

/// Benchmark execution: worker tasks and the reporter that owns the recorder
pub mod benchmark;

/// Command-line interface and configuration
pub mod cli;

/// Console log formatting for the binary
pub mod logging;

/// Latency recorders and percentile extraction
pub mod recorder;

/// Report values and output sinks
pub mod report;

/// Final result output (JSON)
pub mod results;

/// Storage driver capability set and the built-in drivers
pub mod storage;

/// Latency units and the time source
pub mod time;

pub mod utils;

pub use benchmark::{BenchmarkConfig, BenchmarkRunner};
pub use cli::{Args, DriverKind};
pub use recorder::{
    LatencyMerge, LatencyRecorder, LatencyRecords, LatencyWindowConfig, PeriodicLatencyRecorder,
    RecorderConfig,
};
pub use report::{LatencyReport, Print};
pub use storage::{DataReader, DataWriter, Parameters, Storage};
pub use time::TimeUnit;

/// The current version of the benchmark kit
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Product name; upper-cased it prefixes spill file names
    pub const NAME: &str = "sbk";

    pub const BYTES_PER_MB: u64 = 1024 * 1024;

    /// Size of one stored latency value or count
    pub const LATENCY_VALUE_SIZE_BYTES: u64 = 8;

    /// Largest dense histogram table
    pub const MAX_ARRAY_SIZE: i64 = i32::MAX as i64;

    /// Widest window range that still gets a dense table (128 MB of counts)
    pub const ARRAY_WINDOW_MAX_ENTRIES: i64 = 1 << 24;

    /// Memory budget of a sparse histogram
    pub const MAX_HASH_MAP_SIZE_MB: u64 = 256;

    pub const PERCENTILES: [f64; 8] = [0.1, 0.25, 0.5, 0.75, 0.95, 0.99, 0.999, 0.9999];

    pub const MIN_LATENCY: i64 = 0;

    /// Upper bound of the window histogram range
    pub const MAX_WINDOW_LATENCY: i64 = 60_000;

    /// Upper bound of the cumulative histogram range (3 minutes in ms)
    pub const MAX_LATENCY: i64 = 180_000;

    pub const REPORTING_INTERVAL: Duration = Duration::from_secs(5);

    /// Capacity of the sample channel between workers and the reporter
    pub const SAMPLE_QUEUE_DEPTH: usize = 10_000;

    pub const RECORD_SIZE: usize = 1024;

    pub const RECORDS: u64 = 10_000;

    pub const WRITERS: usize = 1;
}
