//! Window plus in-memory cumulative layer.
//!
//! The window absorbs samples and is flushed into the cumulative histogram
//! whenever one of its bounds overflows or a periodic report is due. The
//! cumulative layer keeps the whole-run distribution until it overflows
//! itself, at which point its totals are reported and it starts over.

use super::{
    LatencyRecorder, LatencyWindowConfig, MapLatencyRecorder, PeriodicLatencyRecorder,
};
use crate::defaults::BYTES_PER_MB;
use crate::report::Print;
use std::sync::Arc;
use tracing::{debug, warn};

/// Two-layer recorder: short-lived window `W`, long-lived sparse total
pub struct CompositeMapLatencyRecorder<W> {
    pub(crate) window: W,
    pub(crate) cumulative: MapLatencyRecorder,
    pub(crate) window_sink: Arc<dyn Print>,
    pub(crate) total_sink: Arc<dyn Print>,
}

impl<W: LatencyRecorder> CompositeMapLatencyRecorder<W> {
    pub fn new(
        window: W,
        total: LatencyWindowConfig,
        max_map_size_mb: u64,
        window_sink: Arc<dyn Print>,
        total_sink: Arc<dyn Print>,
    ) -> Self {
        Self {
            window,
            cumulative: MapLatencyRecorder::new(total, max_map_size_mb),
            window_sink,
            total_sink,
        }
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn cumulative(&self) -> &MapLatencyRecorder {
        &self.cumulative
    }

    /// Print the window, folding its histogram and totals into the
    /// cumulative layer, and start a new window
    pub(crate) fn flush_window(&mut self, now: i64) {
        self.window.print(
            now,
            self.window_sink.as_ref(),
            Some(&mut self.cumulative),
        );
        self.window.reset(now);
    }

    fn log_cumulative_overflow(&self) {
        if self.cumulative.is_map_overflow() {
            warn!(
                "Latency map memory size: {} MB exceeded! Current map size in MB: {}",
                self.cumulative.max_map_size_mb(),
                self.cumulative.map_bytes_count() / BYTES_PER_MB
            );
        } else {
            let totals = self.cumulative.records();
            warn!(
                "Total Bytes: {}, Total Records: {}, Total Latency: {}",
                totals.total_bytes, totals.total_records, totals.total_latency
            );
        }
    }
}

impl<W: LatencyRecorder> PeriodicLatencyRecorder for CompositeMapLatencyRecorder<W> {
    fn start(&mut self, start_time: i64) {
        self.window.reset(start_time);
        self.cumulative.reset(start_time);
    }

    fn reset_window(&mut self, start_time: i64) {
        self.window.reset(start_time);
    }

    fn elapsed_milli_seconds(&self, now: i64) -> i64 {
        self.window.elapsed_milli_seconds(now)
    }

    fn record(&mut self, now: i64, bytes: u64, events: u64, latency: i64) {
        self.window.record(bytes, events, latency);
        if self.window.is_overflow() {
            debug!("Window overflow, merging into cumulative totals");
            self.flush_window(now);
            if self.cumulative.is_overflow() {
                self.cumulative.print(now, self.total_sink.as_ref(), None);
                self.cumulative.reset(now);
            }
        }
    }

    fn print(&mut self, now: i64) {
        self.flush_window(now);
        if self.cumulative.is_overflow() {
            self.log_cumulative_overflow();
            self.cumulative.print(now, self.total_sink.as_ref(), None);
            self.start(now);
        }
    }

    fn print_total(&mut self, end: i64) {
        self.window.print_pending_data(
            end,
            self.window_sink.as_ref(),
            Some(&mut self.cumulative),
        );
        self.window.reset(end);
        self.cumulative.print(end, self.total_sink.as_ref(), None);
    }
}
