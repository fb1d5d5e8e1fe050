//! Sparse histogram keyed by latency value.
//!
//! Used when the latency range is too wide for a dense table, and always as
//! the cumulative layer of the composite recorders. Memory is bounded by an
//! estimate of the bytes held per distinct latency, not by the value range.

use super::{LatencyMerge, LatencyRecorder, LatencyRecords, LatencyWindowConfig, PercentileWalk};
use crate::defaults::{BYTES_PER_MB, LATENCY_VALUE_SIZE_BYTES};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Estimated cost of one histogram entry: a latency key and a count
pub const BYTES_PER_ENTRY: u64 = 2 * LATENCY_VALUE_SIZE_BYTES;

/// Map-indexed latency histogram with a memory estimate
#[derive(Debug)]
pub struct MapLatencyRecorder {
    config: LatencyWindowConfig,
    records: LatencyRecords,
    latencies: BTreeMap<i64, u64>,
    max_map_size_mb: u64,
    max_map_bytes: u64,
    map_bytes_count: u64,
}

impl MapLatencyRecorder {
    pub fn new(config: LatencyWindowConfig, max_map_size_mb: u64) -> Self {
        Self {
            config,
            records: LatencyRecords::new(0),
            latencies: BTreeMap::new(),
            max_map_size_mb,
            max_map_bytes: max_map_size_mb.saturating_mul(BYTES_PER_MB),
            map_bytes_count: 0,
        }
    }

    pub fn max_map_size_mb(&self) -> u64 {
        self.max_map_size_mb
    }

    /// Current estimate of the bytes held by the histogram
    pub fn map_bytes_count(&self) -> u64 {
        self.map_bytes_count
    }

    /// Whether the memory estimate alone exceeds its bound
    pub fn is_map_overflow(&self) -> bool {
        self.map_bytes_count > self.max_map_bytes
    }

    /// Number of distinct latencies currently held
    pub fn len(&self) -> usize {
        self.latencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty()
    }

    pub(crate) fn latencies_mut(&mut self) -> &mut BTreeMap<i64, u64> {
        &mut self.latencies
    }

    pub(crate) fn reset_map_bytes(&mut self) {
        self.map_bytes_count = 0;
    }

    fn add(&mut self, latency: i64, events: u64) {
        match self.latencies.entry(latency) {
            Entry::Occupied(mut entry) => *entry.get_mut() += events,
            Entry::Vacant(entry) => {
                entry.insert(events);
                self.map_bytes_count += BYTES_PER_ENTRY;
            }
        }
    }
}

impl LatencyRecorder for MapLatencyRecorder {
    fn config(&self) -> &LatencyWindowConfig {
        &self.config
    }

    fn records(&self) -> &LatencyRecords {
        &self.records
    }

    fn record(&mut self, bytes: u64, events: u64, latency: i64) {
        if self.records.record(&self.config, bytes, events, latency) {
            self.add(latency, events);
        }
    }

    fn is_overflow(&self) -> bool {
        self.is_map_overflow() || self.records.is_overflow(&self.config)
    }

    fn reset(&mut self, start_time: i64) {
        self.records.reset(start_time);
    }

    fn get_percentiles(&mut self, mut merge: Option<&mut dyn LatencyMerge>) -> Vec<i64> {
        if let Some(target) = merge.as_mut() {
            target.update_latency_records(&self.records);
        }

        let mut walk = PercentileWalk::new(
            &self.config.percentile_fractions,
            self.records.valid_latency_records,
        );
        for (latency, count) in std::mem::take(&mut self.latencies) {
            if let Some(target) = merge.as_mut() {
                target.copy_latency(latency, count);
            }
            walk.accept(latency, count);
        }
        self.map_bytes_count = 0;
        walk.finish()
    }
}

impl LatencyMerge for MapLatencyRecorder {
    fn update_latency_records(&mut self, records: &LatencyRecords) {
        self.records.merge(records);
    }

    fn copy_latency(&mut self, latency: i64, events: u64) {
        self.add(latency, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::ArrayLatencyRecorder;
    use crate::time::TimeUnit;

    fn config(fractions: &[f64]) -> LatencyWindowConfig {
        LatencyWindowConfig {
            percentile_fractions: fractions.to_vec(),
            ..LatencyWindowConfig::new(0, 1_000_000, TimeUnit::Us)
        }
    }

    #[test]
    fn test_uniform_percentiles() {
        let mut r = MapLatencyRecorder::new(config(&[0.5, 0.99]), 16);
        r.reset(0);
        for latency in (0..100).rev() {
            r.record(1, 1, latency);
        }
        let p = r.get_percentiles(None);
        assert!((49..=50).contains(&p[0]));
        assert!((98..=99).contains(&p[1]));
    }

    #[test]
    fn test_memory_estimate_and_overflow() {
        let mut r = MapLatencyRecorder::new(config(&[0.5]), 0);
        r.reset(0);
        assert!(!r.is_overflow());

        r.record(0, 1, 7);
        r.record(0, 1, 7);
        assert_eq!(r.map_bytes_count(), BYTES_PER_ENTRY);
        r.record(0, 1, 8);
        assert_eq!(r.map_bytes_count(), 2 * BYTES_PER_ENTRY);
        assert!(r.is_map_overflow());
        assert!(r.is_overflow());

        r.get_percentiles(None);
        assert_eq!(r.map_bytes_count(), 0);
        assert!(r.is_empty());
        assert!(!r.is_overflow());
    }

    #[test]
    fn test_extraction_is_destructive() {
        let mut r = MapLatencyRecorder::new(config(&[0.1, 0.5, 0.9]), 16);
        r.reset(0);
        for latency in [500, 20, 20, 999_999, 3] {
            r.record(0, 1, latency);
        }
        let first = r.get_percentiles(None);
        assert!(first.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(first, vec![3, 20, 999_999]);

        r.reset(5);
        assert_eq!(r.get_percentiles(None), vec![0, 0, 0]);
    }

    #[test]
    fn test_merge_matches_direct_recording() {
        let fractions = [0.25, 0.5, 0.75, 0.95];
        let set_a = [5, 17, 17, 300, 42];
        let set_b = [1, 17, 900, 42, 42, 8];

        // X: sparse target, Y: dense source
        let mut x = MapLatencyRecorder::new(config(&fractions), 16);
        let mut y = ArrayLatencyRecorder::new(LatencyWindowConfig {
            percentile_fractions: fractions.to_vec(),
            ..LatencyWindowConfig::new(0, 1000, TimeUnit::Us)
        });
        let mut direct = MapLatencyRecorder::new(config(&fractions), 16);

        for &l in &set_a {
            x.record(1, 1, l);
            direct.record(1, 1, l);
        }
        for &l in &set_b {
            y.record(1, 1, l);
            direct.record(1, 1, l);
        }

        y.get_percentiles(Some(&mut x));
        assert_eq!(x.records().valid_latency_records, 11);
        assert_eq!(x.records().total_bytes, 11);
        assert_eq!(x.get_percentiles(None), direct.get_percentiles(None));
    }

    #[test]
    fn test_copy_latency_charges_new_keys_only() {
        let mut r = MapLatencyRecorder::new(config(&[0.5]), 16);
        r.copy_latency(10, 4);
        r.copy_latency(10, 1);
        r.copy_latency(11, 1);
        assert_eq!(r.len(), 2);
        assert_eq!(r.map_bytes_count(), 2 * BYTES_PER_ENTRY);
        assert_eq!(r.latencies[&10], 5);
    }
}
