//! # Disk-Spilling Composite Recorder
//!
//! Same window/cumulative layering as [`CompositeMapLatencyRecorder`], but
//! when the cumulative histogram outgrows its memory bound its entries are
//! streamed to a temporary CSV file instead of being reported and dropped.
//! At the end of the run the file is replayed into the cumulative histogram
//! so the final percentiles are computed from the exact whole-run
//! distribution.
//!
//! ## Spill File Lifecycle
//!
//! - Created lazily on the first memory overflow, named
//!   `SBK-NNNNNN.csv` with a random six-digit suffix
//! - Appended to on every subsequent overflow
//! - Replayed and deleted by [`PeriodicLatencyRecorder::print_total`]
//! - Deleted on drop if the run is abandoned before finalization
//!
//! ## Failure Handling
//!
//! Spill I/O never interrupts measurement. A failed create or append is
//! logged, the memory estimate is reset, and recording continues. A failed
//! replay is logged and the final report uses whatever data is resident.

use super::{
    CompositeMapLatencyRecorder, LatencyMerge, LatencyRecorder, LatencyWindowConfig,
    PeriodicLatencyRecorder,
};
use crate::defaults::NAME;
use crate::report::Print;
use crate::time::TimeUnit;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors raised while writing or replaying a spill file
#[derive(Debug, Error)]
pub enum SpillError {
    #[error("spill file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("spill file {path}, line {line}: malformed row {row:?}")]
    Parse {
        path: PathBuf,
        line: usize,
        row: String,
    },
}

fn spill_file_name() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}-{:06}.csv", NAME.to_uppercase(), suffix)
}

/// Uniquely named temporary CSV file holding `(latency, records)` rows
///
/// The file is removed when the handle is dropped, whether or not it was
/// replayed.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    removed: bool,
}

impl SpillFile {
    /// Create a fresh spill file in `dir` and write the header row
    ///
    /// A stale file with the same name is removed first.
    pub fn create(dir: &Path, time_unit: TimeUnit) -> Result<Self, SpillError> {
        Self::create_at(dir.join(spill_file_name()), time_unit)
    }

    fn create_at(path: PathBuf, time_unit: TimeUnit) -> Result<Self, SpillError> {
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale spill file {:?}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove stale spill file {:?}: {}", path, e),
        }

        let file = File::create(&path).map_err(|source| SpillError::Io {
            path: path.clone(),
            source,
        })?;
        let mut spill = Self {
            path,
            writer: Some(BufWriter::new(file)),
            removed: false,
        };
        let header = format!("Latency ({}),Records", time_unit.name());
        spill.write_line(&header)?;
        Ok(spill)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SpillError {
        SpillError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), SpillError> {
        let result = match self.writer.as_mut() {
            Some(writer) => writeln!(writer, "{}", line),
            None => Err(io::Error::new(io::ErrorKind::Other, "spill file is closed")),
        };
        result.map_err(|e| self.io_error(e))
    }

    /// Move every entry of `latencies` into the file, ascending by latency
    ///
    /// Entries are removed from the map as they are written. On error the
    /// entries not yet taken stay in the map.
    pub fn append(&mut self, latencies: &mut BTreeMap<i64, u64>) -> Result<usize, SpillError> {
        let mut written = 0;
        while let Some((latency, records)) = latencies.pop_first() {
            self.write_line(&format!("{},{}", latency, records))?;
            written += 1;
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(|e| SpillError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        Ok(written)
    }

    /// Close the writer, fold every row into `target` through the merge
    /// protocol, then delete the file
    ///
    /// Returns the number of rows replayed. Rows read before a failure have
    /// already been merged.
    pub fn replay(mut self, target: &mut dyn LatencyMerge) -> Result<usize, SpillError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| self.io_error(e))?;
        }

        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut replayed = 0;
        for (line_no, line) in BufReader::new(file).lines().enumerate().skip(1) {
            let line = line.map_err(|e| self.io_error(e))?;
            let row = line.trim();
            if row.is_empty() {
                continue;
            }
            let (latency, records) = parse_row(row).ok_or_else(|| SpillError::Parse {
                path: self.path.clone(),
                line: line_no + 1,
                row: row.to_string(),
            })?;
            target.copy_latency(latency, records);
            replayed += 1;
        }

        self.remove().map_err(|e| self.io_error(e))?;
        Ok(replayed)
    }

    fn remove(&mut self) -> io::Result<()> {
        if !self.removed {
            self.writer = None;
            fs::remove_file(&self.path)?;
            self.removed = true;
        }
        Ok(())
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = self.remove() {
                debug!("Failed to remove spill file {:?}: {}", self.path, e);
            }
        }
    }
}

fn parse_row(row: &str) -> Option<(i64, u64)> {
    let mut fields = row.split(',').map(str::trim);
    let latency = fields.next()?.parse().ok()?;
    let records = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((latency, records))
}

/// Composite recorder whose cumulative layer spills to disk
pub struct CompositeCsvLatencyRecorder<W> {
    layers: CompositeMapLatencyRecorder<W>,
    spill_dir: PathBuf,
    spill: Option<SpillFile>,
}

impl<W: LatencyRecorder> CompositeCsvLatencyRecorder<W> {
    pub fn new(
        window: W,
        total: LatencyWindowConfig,
        max_map_size_mb: u64,
        spill_dir: PathBuf,
        window_sink: Arc<dyn Print>,
        total_sink: Arc<dyn Print>,
    ) -> Self {
        Self {
            layers: CompositeMapLatencyRecorder::new(
                window,
                total,
                max_map_size_mb,
                window_sink,
                total_sink,
            ),
            spill_dir,
            spill: None,
        }
    }

    pub fn layers(&self) -> &CompositeMapLatencyRecorder<W> {
        &self.layers
    }

    /// Path of the active spill file, if one has been created
    pub fn spill_path(&self) -> Option<&Path> {
        self.spill.as_ref().map(SpillFile::path)
    }

    fn spill_cumulative(&mut self) {
        if self.spill.is_none() {
            let unit = self.layers.cumulative.config().time_unit;
            match SpillFile::create(&self.spill_dir, unit) {
                Ok(spill) => {
                    info!("Spilling cumulative latencies to {:?}", spill.path());
                    self.spill = Some(spill);
                }
                Err(e) => {
                    error!("Failed to create spill file: {}", e);
                    self.layers.cumulative.reset_map_bytes();
                    return;
                }
            }
        }

        if let Some(spill) = self.spill.as_mut() {
            match spill.append(self.layers.cumulative.latencies_mut()) {
                Ok(rows) => debug!("Spilled {} latency entries to {:?}", rows, spill.path()),
                Err(e) => error!("Failed to append to spill file: {}", e),
            }
        }
        self.layers.cumulative.reset_map_bytes();
    }
}

impl<W: LatencyRecorder> PeriodicLatencyRecorder for CompositeCsvLatencyRecorder<W> {
    fn start(&mut self, start_time: i64) {
        self.layers.start(start_time);
    }

    fn reset_window(&mut self, start_time: i64) {
        self.layers.reset_window(start_time);
    }

    fn elapsed_milli_seconds(&self, now: i64) -> i64 {
        self.layers.elapsed_milli_seconds(now)
    }

    fn record(&mut self, now: i64, bytes: u64, events: u64, latency: i64) {
        self.layers.window.record(bytes, events, latency);
        if self.layers.window.is_overflow() {
            self.layers.flush_window(now);
        }
    }

    fn print(&mut self, now: i64) {
        self.layers.flush_window(now);
        if self.layers.cumulative.is_map_overflow() {
            self.spill_cumulative();
        }
    }

    fn print_total(&mut self, end: i64) {
        let layers = &mut self.layers;
        layers.window.print_pending_data(
            end,
            layers.window_sink.as_ref(),
            Some(&mut layers.cumulative),
        );
        layers.window.reset(end);

        if let Some(spill) = self.spill.take() {
            let path = spill.path().to_path_buf();
            info!("Reading spill file {:?} ...", path);
            match spill.replay(&mut layers.cumulative) {
                Ok(rows) => info!("Replayed {} rows, deleted spill file {:?}", rows, path),
                Err(e) => error!("Failed to replay spill file: {}", e),
            }
        }

        layers
            .cumulative
            .print(end, layers.total_sink.as_ref(), None);
    }
}
