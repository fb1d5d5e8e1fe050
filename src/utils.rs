//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the report sinks, the benchmark runner and the
//! CLI: formatting for human-readable output and validation of
//! user-supplied parameters.
//!
//! ## Usage Examples
//!
//! ```rust
//! use sbk_bench::utils::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! assert_eq!(percentile_label(0.999), "99.9th");
//! assert_eq!(format_rate(1048576.0), "1.00 MB/s");
//!
//! validate_record_size(1024)?; // OK
//! # Ok(())
//! # }
//! ```

use anyhow::Result;

/// Human-readable label for a percentile fraction
///
/// ## Examples
///
/// ```rust
/// # use sbk_bench::utils::percentile_label;
/// assert_eq!(percentile_label(0.5), "50th");
/// assert_eq!(percentile_label(0.9999), "99.99th");
/// ```
pub fn percentile_label(fraction: f64) -> String {
    // Round away float noise such as 0.999 * 100 = 99.89999...
    let percent = (fraction * 100.0 * 1_000_000.0).round() / 1_000_000.0;
    format!("{}th", percent)
}

/// Format a byte count in a human-readable way
///
/// Uses binary scaling (powers of 1024) with two decimal places above one
/// kilobyte.
pub fn format_bytes_f64(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes < KB {
        format!("{:.0} B", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes / KB)
    } else if bytes < GB {
        format!("{:.2} MB", bytes / MB)
    } else {
        format!("{:.2} GB", bytes / GB)
    }
}

/// Format a throughput rate in bytes per second
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes_f64(bytes_per_second))
}

/// Format a record rate in a human-readable way
///
/// ## Unit Scaling
///
/// Uses decimal scaling (powers of 1000):
/// - Records/sec: < 1,000 (e.g., "750 rec/s")
/// - Thousands: < 1,000,000 (e.g., "15.50K rec/s")
/// - Millions: ≥ 1,000,000 (e.g., "2.30M rec/s")
pub fn format_record_rate(records_per_second: f64) -> String {
    if records_per_second < 1000.0 {
        format!("{:.0} rec/s", records_per_second)
    } else if records_per_second < 1_000_000.0 {
        format!("{:.2}K rec/s", records_per_second / 1000.0)
    } else {
        format!("{:.2}M rec/s", records_per_second / 1_000_000.0)
    }
}

/// Validate that a record size is reasonable
///
/// ## Validation Rules
///
/// - **Minimum**: 1 byte (zero-length records carry no payload to time)
/// - **Maximum**: 16 MB (prevent excessive memory usage per worker)
pub fn validate_record_size(record_size: usize) -> Result<()> {
    if record_size == 0 {
        anyhow::bail!("Record size cannot be zero");
    }
    if record_size > 16 * 1024 * 1024 {
        anyhow::bail!("Record size {} is too large (maximum 16MB)", record_size);
    }
    Ok(())
}

/// Validate the number of writer and reader workers
///
/// At least one worker must run, and neither side may exceed 1024 workers.
pub fn validate_workers(writers: usize, readers: usize) -> Result<()> {
    if writers == 0 && readers == 0 {
        anyhow::bail!("At least one writer or reader is required");
    }
    if writers > 1024 || readers > 1024 {
        anyhow::bail!(
            "Worker count too high: {} writers, {} readers (maximum 1024 each)",
            writers,
            readers
        );
    }
    Ok(())
}

/// Parse a driver option given as `key=value`
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Expected key=value, got: {}", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Empty option name in: {}", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
