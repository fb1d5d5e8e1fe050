//! Dense histogram over a bounded latency range.
//!
//! Recording is a single slot increment. The lowest and highest slot ever
//! written are tracked so that percentile extraction only scans the
//! observed span instead of the whole table.

use super::{LatencyMerge, LatencyRecorder, LatencyRecords, LatencyWindowConfig, PercentileWalk};
use crate::defaults::MAX_ARRAY_SIZE;
use tracing::warn;

/// Array-indexed latency histogram
#[derive(Debug)]
pub struct ArrayLatencyRecorder {
    config: LatencyWindowConfig,
    records: LatencyRecords,
    latencies: Vec<u64>,
    min_index: usize,
    max_index: usize,
}

impl ArrayLatencyRecorder {
    /// Create a recorder with a table of `min(high - low, MAX_ARRAY_SIZE)`
    /// slots
    pub fn new(config: LatencyWindowConfig) -> Self {
        Self::with_max_size(config, MAX_ARRAY_SIZE)
    }

    /// Create a recorder whose table holds at most `max_size` slots
    ///
    /// When the configured range is wider than the table, the valid range is
    /// narrowed to `[low, low + len)` and larger samples count as higher
    /// discards.
    pub fn with_max_size(mut config: LatencyWindowConfig, max_size: i64) -> Self {
        let size = config.latency_range().clamp(0, max_size.max(0));
        config.high_latency = config.low_latency + size;
        let size = size as usize;

        Self {
            config,
            records: LatencyRecords::new(0),
            latencies: vec![0; size],
            min_index: size,
            max_index: 0,
        }
    }

    fn index_of(&self, latency: i64) -> Option<usize> {
        if latency < self.config.low_latency || latency >= self.config.high_latency {
            return None;
        }
        Some((latency - self.config.low_latency) as usize)
    }

    fn add(&mut self, index: usize, events: u64) {
        self.min_index = self.min_index.min(index);
        self.max_index = self.max_index.max(index);
        self.latencies[index] += events;
    }

    fn has_span(&self) -> bool {
        self.min_index <= self.max_index && self.min_index < self.latencies.len()
    }
}

impl LatencyRecorder for ArrayLatencyRecorder {
    fn config(&self) -> &LatencyWindowConfig {
        &self.config
    }

    fn records(&self) -> &LatencyRecords {
        &self.records
    }

    fn record(&mut self, bytes: u64, events: u64, latency: i64) {
        if self.records.record(&self.config, bytes, events, latency) {
            let index = (latency - self.config.low_latency) as usize;
            self.add(index, events);
        }
    }

    fn reset(&mut self, start_time: i64) {
        self.records.reset(start_time);
        // Anything not drained by an extraction is dropped with the cycle
        if self.has_span() {
            let end = self.max_index.min(self.latencies.len() - 1);
            self.latencies[self.min_index..=end].fill(0);
        }
        self.min_index = self.latencies.len();
        self.max_index = 0;
    }

    fn get_percentiles(&mut self, mut merge: Option<&mut dyn LatencyMerge>) -> Vec<i64> {
        if let Some(target) = merge.as_mut() {
            target.update_latency_records(&self.records);
        }

        let mut walk = PercentileWalk::new(
            &self.config.percentile_fractions,
            self.records.valid_latency_records,
        );
        if self.has_span() {
            let end = self.latencies.len().min(self.max_index + 1);
            for i in self.min_index..end {
                let count = self.latencies[i];
                if count == 0 {
                    continue;
                }
                let latency = i as i64 + self.config.low_latency;
                if let Some(target) = merge.as_mut() {
                    target.copy_latency(latency, count);
                }
                walk.accept(latency, count);
                self.latencies[i] = 0;
            }
        }
        self.min_index = self.latencies.len();
        self.max_index = 0;
        walk.finish()
    }
}

impl LatencyMerge for ArrayLatencyRecorder {
    fn update_latency_records(&mut self, records: &LatencyRecords) {
        self.records.merge(records);
    }

    fn copy_latency(&mut self, latency: i64, events: u64) {
        match self.index_of(latency) {
            Some(index) => self.add(index, events),
            None => warn!(
                "Dropping {} merged records at latency {} outside [{}, {})",
                events, latency, self.config.low_latency, self.config.high_latency
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeUnit;

    fn recorder(low: i64, high: i64, fractions: &[f64]) -> ArrayLatencyRecorder {
        let config = LatencyWindowConfig {
            percentile_fractions: fractions.to_vec(),
            ..LatencyWindowConfig::new(low, high, TimeUnit::Ms)
        };
        ArrayLatencyRecorder::new(config)
    }

    #[test]
    fn test_uniform_percentiles() {
        let mut r = recorder(0, 1000, &[0.5, 0.99]);
        r.reset(0);
        for latency in 0..100 {
            r.record(10, 1, latency);
        }
        assert_eq!(r.records().valid_latency_records, 100);

        let p = r.get_percentiles(None);
        assert!((49..=50).contains(&p[0]), "p50 = {}", p[0]);
        assert!((98..=99).contains(&p[1]), "p99 = {}", p[1]);
    }

    #[test]
    fn test_half_open_boundaries() {
        let mut r = recorder(5, 10, &[0.0, 1.0]);
        r.reset(0);
        r.record(0, 1, 5);
        r.record(0, 1, 10);

        assert_eq!(r.records().valid_latency_records, 1);
        assert_eq!(r.records().higher_latency_discard_records, 1);
        assert_eq!(r.min_index, 0);
        assert_eq!(r.get_percentiles(None), vec![5, 5]);
    }

    #[test]
    fn test_extraction_is_destructive() {
        let mut r = recorder(0, 100, &[0.25, 0.75]);
        r.reset(0);
        for latency in [3, 3, 7, 40] {
            r.record(0, 1, latency);
        }
        assert_eq!(r.get_percentiles(None), vec![3, 40]);
        assert!(r.latencies.iter().all(|&c| c == 0));

        r.reset(1);
        assert_eq!(r.get_percentiles(None), vec![0, 0]);
    }

    #[test]
    fn test_events_weight_buckets() {
        let mut r = recorder(0, 100, &[0.5, 0.9]);
        r.reset(0);
        r.record(0, 9, 1);
        r.record(0, 1, 50);
        assert_eq!(r.records().valid_latency_records, 10);
        assert_eq!(r.get_percentiles(None), vec![1, 50]);
    }

    #[test]
    fn test_reset_drops_undrained_counts() {
        let mut r = recorder(0, 100, &[0.5]);
        r.reset(0);
        r.record(0, 1, 42);
        r.reset(10);
        r.record(0, 1, 7);
        assert_eq!(r.get_percentiles(None), vec![7]);
    }

    #[test]
    fn test_wide_range_is_capped() {
        let config = LatencyWindowConfig {
            percentile_fractions: vec![0.5, 1.0],
            ..LatencyWindowConfig::new(10, 1_000_000, TimeUnit::Ns)
        };
        let mut r = ArrayLatencyRecorder::with_max_size(config, 100);
        assert_eq!(r.config().high_latency, 110);
        assert_eq!(r.latencies.len(), 100);

        r.reset(0);
        r.record(0, 1, 10);
        r.record(0, 1, 109);
        r.record(0, 1, 110);
        r.record(0, 1, 5_000);

        let records = r.records();
        assert_eq!(records.valid_latency_records, 2);
        assert_eq!(records.higher_latency_discard_records, 2);
        assert_eq!(records.max_latency, 5_000);
        assert_eq!(r.get_percentiles(None), vec![109, 109]);

        // Merged latencies beyond the narrowed range are dropped
        r.copy_latency(500, 3);
        assert!(!r.has_span());
    }

    #[test]
    fn test_default_cap_is_max_array_size() {
        let config = LatencyWindowConfig::new(0, 1000, TimeUnit::Ms);
        let capped = ArrayLatencyRecorder::with_max_size(config.clone(), MAX_ARRAY_SIZE);
        assert_eq!(capped.config(), ArrayLatencyRecorder::new(config).config());
    }

    #[test]
    fn test_merge_into_array() {
        let mut a = recorder(0, 100, &[0.5]);
        let mut b = recorder(0, 100, &[0.5]);
        a.reset(0);
        b.reset(0);
        b.record(0, 1, 20);
        b.record(0, 1, 30);
        b.record(0, 1, 30);

        b.get_percentiles(Some(&mut a));
        assert_eq!(a.records().valid_latency_records, 3);
        assert_eq!(a.get_percentiles(None), vec![30]);
    }
}
