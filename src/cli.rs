use crate::time::TimeUnit;
use crate::utils::parse_key_value;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// SBK - storage benchmark kit with bounded-memory latency percentiles
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Storage driver to benchmark
    #[clap(short = 'c', long = "class", value_enum, default_value_t = DriverKind::Null, help_heading = "Core Options")]
    pub driver: DriverKind,

    /// Number of writers
    #[clap(short = 'w', long, default_value_t = crate::defaults::WRITERS, help_heading = "Core Options")]
    pub writers: usize,

    /// Number of readers
    #[clap(short = 'r', long, default_value_t = 0, help_heading = "Core Options")]
    pub readers: usize,

    /// Records per worker (ignored if a time limit is given)
    #[clap(short = 'n', long, default_value_t = crate::defaults::RECORDS)]
    pub records: u64,

    /// Record size in bytes
    #[clap(short = 's', long, default_value_t = crate::defaults::RECORD_SIZE)]
    pub size: usize,

    /// Run for this long instead of a fixed record count (e.g. "30s", "5m")
    #[clap(short = 't', long, value_parser = parse_duration)]
    pub time: Option<Duration>,

    /// Unit of recorded latencies
    #[clap(long, value_enum, default_value_t = TimeUnit::Ms)]
    pub time_unit: TimeUnit,

    /// Periodic reporting interval (e.g. "5s")
    #[clap(long, value_parser = parse_duration, default_value = "5s")]
    pub interval: Duration,

    /// Lowest latency placed in the histograms
    #[clap(long, default_value_t = crate::defaults::MIN_LATENCY, help_heading = "Latency Options")]
    pub min_latency: i64,

    /// Upper bound (exclusive) of the window histogram
    #[clap(long, default_value_t = crate::defaults::MAX_WINDOW_LATENCY, help_heading = "Latency Options")]
    pub max_window_latency: i64,

    /// Upper bound (exclusive) of the cumulative histogram
    #[clap(long, default_value_t = crate::defaults::MAX_LATENCY, help_heading = "Latency Options")]
    pub max_latency: i64,

    /// Flush the window into the totals after this many records
    #[clap(long, help_heading = "Latency Options")]
    pub window_records: Option<u64>,

    /// Percentiles to report
    #[clap(long, num_args = 1.., default_values_t = vec![10.0, 25.0, 50.0, 75.0, 95.0, 99.0, 99.9, 99.99], help_heading = "Latency Options")]
    pub percentiles: Vec<f64>,

    /// Memory budget of the cumulative latency map in MB
    #[clap(long, default_value_t = crate::defaults::MAX_HASH_MAP_SIZE_MB, help_heading = "Latency Options")]
    pub max_map_size_mb: u64,

    /// Spill the cumulative latency map to a temporary CSV file instead of
    /// resetting it when the memory budget is exceeded
    #[clap(long, default_value_t = false, help_heading = "Latency Options")]
    pub csv: bool,

    /// Directory for spill files (defaults to the system temp directory)
    #[clap(long, help_heading = "Latency Options")]
    pub spill_dir: Option<PathBuf>,

    /// Write the final reports to this JSON file
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Driver option as key=value (repeatable)
    #[clap(short = 'D', long = "option", value_parser = parse_key_value)]
    pub options: Vec<(String, String)>,
}

/// Available storage drivers
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum DriverKind {
    /// No-op driver measuring harness overhead
    #[clap(name = "null")]
    Null,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Null => write!(f, "Null"),
        }
    }
}

/// Parse duration from string (e.g., "10s", "5m", "1h")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}
