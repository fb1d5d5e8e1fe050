//! # Latency Recorders
//!
//! This module contains the latency-recording and percentile-extraction
//! engine. Samples of `(bytes, events, latency)` are accumulated per
//! reporting window and periodically folded into a long-running cumulative
//! total, all inside a bounded memory budget.
//!
//! ## Building Blocks
//!
//! - [`LatencyRecords`]: scalar running totals of one accumulation cycle and
//!   the per-sample validity decision
//! - [`ArrayLatencyRecorder`]: dense histogram indexed by `latency - low`
//! - [`MapLatencyRecorder`]: sparse histogram keyed by latency with an
//!   estimated memory footprint
//! - [`CompositeMapLatencyRecorder`]: short window plus in-memory cumulative
//!   layer
//! - [`CompositeCsvLatencyRecorder`]: same layering, but the cumulative layer
//!   spills to a temporary CSV file instead of resetting when its memory
//!   bound is exceeded
//!
//! ## Ownership
//!
//! None of the recorders synchronize internally. Every mutating operation
//! takes `&mut self`, so a recorder has exactly one owner at a time. Several
//! producers feed one recorder through a channel into the owning task (see
//! [`crate::benchmark::LatencyReporter`]).
//!
//! ## Percentile Extraction
//!
//! Extraction is destructive: buckets are drained as they are scanned, so
//! histogram memory never outlives a report. When a merge target is passed
//! the scalar totals and every drained bucket are forwarded to it first
//! (see [`LatencyMerge`]).

use crate::defaults;
use crate::report::{LatencyReport, Print};
use crate::time::TimeUnit;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod array;
pub mod composite;
pub mod csv;
pub mod map;

pub use array::ArrayLatencyRecorder;
pub use composite::CompositeMapLatencyRecorder;
pub use csv::{CompositeCsvLatencyRecorder, SpillError, SpillFile};
pub use map::MapLatencyRecorder;

/// Immutable configuration of one recording window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyWindowConfig {
    /// Lowest latency placed in the histogram (inclusive)
    pub low_latency: i64,
    /// Upper bound of the histogram range (exclusive)
    pub high_latency: i64,
    pub total_latency_max: u64,
    pub total_records_max: u64,
    pub total_bytes_max: u64,
    /// Fractions in `[0, 1]`, non-decreasing
    pub percentile_fractions: Vec<f64>,
    pub time_unit: TimeUnit,
}

impl LatencyWindowConfig {
    /// Window over `[low_latency, high_latency)` with unbounded totals and the
    /// default percentile set
    pub fn new(low_latency: i64, high_latency: i64, time_unit: TimeUnit) -> Self {
        Self {
            low_latency,
            high_latency,
            total_latency_max: u64::MAX,
            total_records_max: u64::MAX,
            total_bytes_max: u64::MAX,
            percentile_fractions: defaults::PERCENTILES.to_vec(),
            time_unit,
        }
    }

    /// Number of distinct latency values in the valid range
    pub fn latency_range(&self) -> i64 {
        self.high_latency.saturating_sub(self.low_latency)
    }

    pub fn validate(&self) -> Result<()> {
        if self.low_latency < 0 {
            bail!("low latency must not be negative: {}", self.low_latency);
        }
        if self.low_latency >= self.high_latency {
            bail!(
                "latency range is empty: [{}, {})",
                self.low_latency,
                self.high_latency
            );
        }
        if self.total_latency_max == 0 || self.total_records_max == 0 || self.total_bytes_max == 0 {
            bail!("window totals must be positive");
        }
        if self.percentile_fractions.is_empty() {
            bail!("at least one percentile fraction is required");
        }
        if let Some(f) = self
            .percentile_fractions
            .iter()
            .find(|f| !(0.0..=1.0).contains(*f))
        {
            bail!("percentile fraction {} is outside [0, 1]", f);
        }
        if self.percentile_fractions.windows(2).any(|w| w[0] > w[1]) {
            bail!("percentile fractions must be in ascending order");
        }
        Ok(())
    }
}

/// Scalar running totals of one accumulation cycle
///
/// `total_records` always equals the sum of the four disjoint counters
/// `invalid + lower_discard + higher_discard + valid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRecords {
    pub start_time: i64,
    pub total_records: u64,
    pub total_latency: u64,
    pub total_bytes: u64,
    pub max_latency: i64,
    pub invalid_latency_records: u64,
    pub lower_latency_discard_records: u64,
    pub higher_latency_discard_records: u64,
    pub valid_latency_records: u64,
}

impl LatencyRecords {
    pub fn new(start_time: i64) -> Self {
        Self {
            start_time,
            ..Self::default()
        }
    }

    /// Account for one sample of `events` events and decide whether its
    /// latency belongs in the histogram
    ///
    /// Negative latencies are invalid and excluded from the latency sum.
    /// Latencies outside `[low, high)` count towards the totals but are
    /// discarded from the histogram.
    pub fn record(
        &mut self,
        config: &LatencyWindowConfig,
        bytes: u64,
        events: u64,
        latency: i64,
    ) -> bool {
        self.total_records += events;
        self.total_bytes += bytes;

        if latency < 0 {
            self.invalid_latency_records += events;
            return false;
        }

        self.total_latency = self
            .total_latency
            .saturating_add((latency as u64).saturating_mul(events));
        self.max_latency = self.max_latency.max(latency);

        if latency < config.low_latency {
            self.lower_latency_discard_records += events;
            false
        } else if latency >= config.high_latency {
            self.higher_latency_discard_records += events;
            false
        } else {
            self.valid_latency_records += events;
            true
        }
    }

    pub fn is_overflow(&self, config: &LatencyWindowConfig) -> bool {
        self.total_latency >= config.total_latency_max
            || self.total_records >= config.total_records_max
            || self.total_bytes >= config.total_bytes_max
    }

    pub fn reset(&mut self, start_time: i64) {
        *self = Self::new(start_time);
    }

    pub fn elapsed_milli_seconds(&self, now: i64) -> i64 {
        now - self.start_time
    }

    /// Add another cycle's totals into this one; `max_latency` takes the max
    pub fn merge(&mut self, other: &LatencyRecords) {
        self.total_records += other.total_records;
        self.total_latency = self.total_latency.saturating_add(other.total_latency);
        self.total_bytes += other.total_bytes;
        self.invalid_latency_records += other.invalid_latency_records;
        self.lower_latency_discard_records += other.lower_latency_discard_records;
        self.higher_latency_discard_records += other.higher_latency_discard_records;
        self.valid_latency_records += other.valid_latency_records;
        self.max_latency = self.max_latency.max(other.max_latency);
    }
}

/// Target of the merge protocol used for window→cumulative and
/// file→cumulative folds
pub trait LatencyMerge {
    /// Add the source's scalar totals
    fn update_latency_records(&mut self, records: &LatencyRecords);

    /// Add `events` to the histogram bucket of `latency`
    fn copy_latency(&mut self, latency: i64, events: u64);
}

/// Single ascending pass that assigns a latency to every percentile rank
///
/// For `N` valid records the rank of fraction `f` is `floor(N × f)`, capped
/// at `N - 1` so that a fraction of `1.0` resolves to the largest latency.
/// A bucket of `count` events at `latency` satisfies every pending rank in
/// `[cur, cur + count)`.
pub(crate) struct PercentileWalk {
    ranks: Vec<u64>,
    values: Vec<i64>,
    index: usize,
    cur: u64,
}

impl PercentileWalk {
    pub(crate) fn new(fractions: &[f64], valid_records: u64) -> Self {
        let last = valid_records.saturating_sub(1);
        let ranks = fractions
            .iter()
            .map(|f| ((valid_records as f64 * f) as u64).min(last))
            .collect();
        Self {
            ranks,
            values: vec![0; fractions.len()],
            index: 0,
            cur: 0,
        }
    }

    pub(crate) fn accept(&mut self, latency: i64, count: u64) {
        let next = self.cur + count;
        while self.index < self.ranks.len() {
            let rank = self.ranks[self.index];
            if rank >= self.cur && rank < next {
                self.values[self.index] = latency;
                self.index += 1;
            } else {
                break;
            }
        }
        self.cur = next;
    }

    pub(crate) fn finish(self) -> Vec<i64> {
        self.values
    }
}

/// Capability set shared by the histogram strategies
pub trait LatencyRecorder: Send {
    fn config(&self) -> &LatencyWindowConfig;

    fn records(&self) -> &LatencyRecords;

    /// Record one sample; only valid latencies reach the histogram
    fn record(&mut self, bytes: u64, events: u64, latency: i64);

    fn is_overflow(&self) -> bool {
        self.records().is_overflow(self.config())
    }

    /// Start a new cycle at `start_time`
    fn reset(&mut self, start_time: i64);

    /// Extract one latency per configured fraction, draining the histogram
    ///
    /// When `merge` is given, the scalar totals and every drained bucket are
    /// forwarded to it before this returns.
    fn get_percentiles(&mut self, merge: Option<&mut dyn LatencyMerge>) -> Vec<i64>;

    fn elapsed_milli_seconds(&self, now: i64) -> i64 {
        self.records().elapsed_milli_seconds(now)
    }

    /// Extract percentiles and hand the resulting report to `sink`
    fn print(&mut self, now: i64, sink: &dyn Print, merge: Option<&mut dyn LatencyMerge>) {
        let percentiles = self.get_percentiles(merge);
        let report = LatencyReport::new(self.records(), self.config(), now, percentiles);
        sink.print(&report);
    }

    /// Like [`LatencyRecorder::print`], but silent for a cycle that saw no
    /// records at all
    fn print_pending_data(
        &mut self,
        now: i64,
        sink: &dyn Print,
        merge: Option<&mut dyn LatencyMerge>,
    ) {
        if self.records().total_records > 0 {
            self.print(now, sink, merge);
        }
    }
}

/// A window/cumulative pair driven by the reporting loop
pub trait PeriodicLatencyRecorder: Send {
    /// Reset both the window and the cumulative layer
    fn start(&mut self, start_time: i64);

    fn reset_window(&mut self, start_time: i64);

    /// Elapsed time of the current window
    fn elapsed_milli_seconds(&self, now: i64) -> i64;

    fn record(&mut self, now: i64, bytes: u64, events: u64, latency: i64);

    /// Periodic report: print the window into the cumulative layer and
    /// handle cumulative overflow
    fn print(&mut self, now: i64);

    /// Final report of the run
    fn print_total(&mut self, end: i64);
}

/// Everything needed to construct the recorder stack of one measured stream
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub window: LatencyWindowConfig,
    pub total: LatencyWindowConfig,
    pub max_map_size_mb: u64,
    /// Widest latency range that still gets a dense window table
    pub array_window_max_entries: i64,
    /// Directory for spill files; `None` keeps the cumulative layer in memory
    pub spill_dir: Option<PathBuf>,
}

impl RecorderConfig {
    pub fn new(window: LatencyWindowConfig, total: LatencyWindowConfig) -> Self {
        Self {
            window,
            total,
            max_map_size_mb: defaults::MAX_HASH_MAP_SIZE_MB,
            array_window_max_entries: defaults::ARRAY_WINDOW_MAX_ENTRIES,
            spill_dir: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.total.validate()?;
        if self.window.percentile_fractions != self.total.percentile_fractions {
            bail!("window and total must report the same percentiles");
        }
        Ok(())
    }

    /// Whether the window fits a dense table
    pub fn uses_array_window(&self) -> bool {
        self.window.latency_range() <= self.array_window_max_entries
    }

    /// Build the composite recorder described by this configuration
    pub fn build(
        &self,
        window_sink: Arc<dyn Print>,
        total_sink: Arc<dyn Print>,
    ) -> Result<Box<dyn PeriodicLatencyRecorder>> {
        self.validate()?;

        let recorder: Box<dyn PeriodicLatencyRecorder> =
            match (self.uses_array_window(), &self.spill_dir) {
                (true, None) => Box::new(CompositeMapLatencyRecorder::new(
                    ArrayLatencyRecorder::new(self.window.clone()),
                    self.total.clone(),
                    self.max_map_size_mb,
                    window_sink,
                    total_sink,
                )),
                (false, None) => Box::new(CompositeMapLatencyRecorder::new(
                    MapLatencyRecorder::new(self.window.clone(), self.max_map_size_mb),
                    self.total.clone(),
                    self.max_map_size_mb,
                    window_sink,
                    total_sink,
                )),
                (true, Some(dir)) => Box::new(CompositeCsvLatencyRecorder::new(
                    ArrayLatencyRecorder::new(self.window.clone()),
                    self.total.clone(),
                    self.max_map_size_mb,
                    dir.clone(),
                    window_sink,
                    total_sink,
                )),
                (false, Some(dir)) => Box::new(CompositeCsvLatencyRecorder::new(
                    MapLatencyRecorder::new(self.window.clone(), self.max_map_size_mb),
                    self.total.clone(),
                    self.max_map_size_mb,
                    dir.clone(),
                    window_sink,
                    total_sink,
                )),
            };
        Ok(recorder)
    }
}
