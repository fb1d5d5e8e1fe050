//! # Latency Reports and Output Sinks
//!
//! Every `print` call on a recorder produces one [`LatencyReport`]: the raw
//! numbers for a window (or for the cumulative total) plus one latency value
//! per configured percentile fraction. Where the report ends up is decided by
//! the [`Print`] sink it is handed.
//!
//! Two sinks are provided:
//!
//! - [`LogPrinter`]: renders the report as a single line through `tracing`
//! - [`ReportCollector`]: keeps the reports in memory for later inspection
//!   (final JSON results, tests)

use crate::defaults::BYTES_PER_MB;
use crate::logging::REPORT_TARGET;
use crate::recorder::{LatencyRecords, LatencyWindowConfig};
use crate::time::TimeUnit;
use crate::utils::percentile_label;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Statistics for one reporting window or for a cumulative total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub elapsed_ms: i64,
    pub total_bytes: u64,
    pub total_records: u64,
    pub records_per_sec: f64,
    pub mb_per_sec: f64,
    pub avg_latency: f64,
    pub max_latency: i64,
    pub invalid_latency_records: u64,
    pub lower_latency_discard_records: u64,
    pub higher_latency_discard_records: u64,
    pub valid_latency_records: u64,
    pub time_unit: TimeUnit,
    pub percentile_fractions: Vec<f64>,
    pub percentiles: Vec<i64>,
}

impl LatencyReport {
    /// Build a report from the aggregate counters of a recorder
    ///
    /// `percentiles` must be the output of the recorder's percentile
    /// extraction, one value per configured fraction. Elapsed time is clamped
    /// to one millisecond so that rates stay finite for instantaneous windows.
    pub fn new(
        records: &LatencyRecords,
        config: &LatencyWindowConfig,
        now: i64,
        percentiles: Vec<i64>,
    ) -> Self {
        let elapsed_ms = records.elapsed_milli_seconds(now).max(1);
        let elapsed_sec = elapsed_ms as f64 / 1000.0;
        let mbytes = records.total_bytes as f64 / BYTES_PER_MB as f64;

        // Negative samples never contribute to total_latency
        let timed_records = records.total_records - records.invalid_latency_records;
        let avg_latency = if timed_records > 0 {
            records.total_latency as f64 / timed_records as f64
        } else {
            0.0
        };

        Self {
            elapsed_ms,
            total_bytes: records.total_bytes,
            total_records: records.total_records,
            records_per_sec: records.total_records as f64 / elapsed_sec,
            mb_per_sec: mbytes / elapsed_sec,
            avg_latency,
            max_latency: records.max_latency,
            invalid_latency_records: records.invalid_latency_records,
            lower_latency_discard_records: records.lower_latency_discard_records,
            higher_latency_discard_records: records.higher_latency_discard_records,
            valid_latency_records: records.valid_latency_records,
            time_unit: config.time_unit,
            percentile_fractions: config.percentile_fractions.clone(),
            percentiles,
        }
    }

    /// Latency reported for `fraction`, if that fraction was configured
    pub fn percentile(&self, fraction: f64) -> Option<i64> {
        self.percentile_fractions
            .iter()
            .position(|&f| (f - fraction).abs() < f64::EPSILON)
            .and_then(|i| self.percentiles.get(i).copied())
    }
}

impl std::fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = self.time_unit.suffix();
        write!(
            f,
            "{} records, {:.1} records/sec, {:.2} MB/sec, {:.1} {} avg latency, {} {} max latency; \
             {} invalid latencies; Discarded Latencies: {} lower, {} higher; Latency Percentiles:",
            self.total_records,
            self.records_per_sec,
            self.mb_per_sec,
            self.avg_latency,
            unit,
            self.max_latency,
            unit,
            self.invalid_latency_records,
            self.lower_latency_discard_records,
            self.higher_latency_discard_records,
        )?;
        for (i, (fraction, value)) in self
            .percentile_fractions
            .iter()
            .zip(self.percentiles.iter())
            .enumerate()
        {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{} {} {}", sep, value, unit, percentile_label(*fraction))?;
        }
        write!(f, " (elapsed {} ms)", self.elapsed_ms)
    }
}

/// Output capability: receives one report per recorder print call
pub trait Print: Send + Sync {
    fn print(&self, report: &LatencyReport);
}

/// Sink that renders reports through `tracing`
#[derive(Debug, Clone)]
pub struct LogPrinter {
    prefix: String,
}

impl LogPrinter {
    /// `prefix` distinguishes streams, e.g. "Writing" vs "Total Writing"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Print for LogPrinter {
    fn print(&self, report: &LatencyReport) {
        info!(target: REPORT_TARGET, "{} {}", self.prefix, report);
    }
}

/// Sink that keeps every report it receives
#[derive(Debug, Clone, Default)]
pub struct ReportCollector {
    reports: Arc<Mutex<Vec<LatencyReport>>>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<LatencyReport> {
        self.reports.lock().clone()
    }

    pub fn last(&self) -> Option<LatencyReport> {
        self.reports.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl Print for ReportCollector {
    fn print(&self, report: &LatencyReport) {
        self.reports.lock().push(report.clone());
    }
}

/// Sink that forwards every report to several sinks in order
#[derive(Clone, Default)]
pub struct PrintAll {
    sinks: Vec<Arc<dyn Print>>,
}

impl PrintAll {
    pub fn new(sinks: Vec<Arc<dyn Print>>) -> Self {
        Self { sinks }
    }
}

impl Print for PrintAll {
    fn print(&self, report: &LatencyReport) {
        for sink in &self.sinks {
            sink.print(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LatencyWindowConfig {
        LatencyWindowConfig {
            percentile_fractions: vec![0.5, 0.999],
            ..LatencyWindowConfig::new(0, 1000, TimeUnit::Ms)
        }
    }

    #[test]
    fn test_report_rates() {
        let config = config();
        let mut records = LatencyRecords::new(1_000);
        records.record(&config, 2 * BYTES_PER_MB, 4, 10);
        records.record(&config, 0, 1, -1);

        let report = LatencyReport::new(&records, &config, 3_000, vec![10, 10]);
        assert_eq!(report.elapsed_ms, 2_000);
        assert_eq!(report.total_records, 5);
        assert!((report.records_per_sec - 2.5).abs() < 1e-9);
        assert!((report.mb_per_sec - 1.0).abs() < 1e-9);
        assert!((report.avg_latency - 10.0).abs() < 1e-9);
        assert_eq!(report.invalid_latency_records, 1);
        assert_eq!(report.percentile(0.999), Some(10));
        assert_eq!(report.percentile(0.75), None);
    }

    #[test]
    fn test_report_zero_elapsed_is_clamped() {
        let config = config();
        let records = LatencyRecords::new(500);
        let report = LatencyReport::new(&records, &config, 500, vec![0, 0]);
        assert_eq!(report.elapsed_ms, 1);
        assert_eq!(report.avg_latency, 0.0);
    }

    #[test]
    fn test_report_display() {
        let config = config();
        let records = LatencyRecords::new(0);
        let line = LatencyReport::new(&records, &config, 10, vec![3, 7]).to_string();
        assert!(line.contains("Latency Percentiles: 3 ms 50th, 7 ms 99.9th"));
        assert!(line.contains("0 records"));
    }

    #[test]
    fn test_collector_and_fanout() {
        let a = ReportCollector::new();
        let b = ReportCollector::new();
        let all = PrintAll::new(vec![Arc::new(a.clone()), Arc::new(b.clone())]);

        let config = config();
        let report = LatencyReport::new(&LatencyRecords::new(0), &config, 5, vec![1, 2]);
        all.print(&report);

        assert_eq!(a.len(), 1);
        assert_eq!(b.last(), Some(report));
    }
}
