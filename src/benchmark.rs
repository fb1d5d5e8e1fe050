//! # Benchmark Engine Module
//!
//! Drives a storage driver with writer and reader workers and turns the
//! timing of every call into latency samples for the recorders.
//!
//! ## Key Components
//!
//! - **BenchmarkConfig**: validated run configuration built from the CLI
//! - **BenchmarkRunner**: opens the driver, spawns workers and reporters,
//!   and collects the final reports
//! - **LatencyReporter**: the single owner of one recorder stack
//!
//! ## Concurrency Handling
//!
//! Recorders are not synchronized. Each measured stream (writing, reading)
//! gets one reporter task that owns its recorder outright; workers only
//! hold a [`mpsc::Sender`] and push [`Sample`]s into it. The reporter
//! interleaves sample recording with periodic prints on an interval timer
//! and finalizes the run once every sender has been dropped.
//!
//! Spill file I/O happens synchronously inside the reporter task, never on
//! a worker, so the timed calls are not delayed by it.

use crate::{
    cli::{Args, DriverKind},
    defaults,
    recorder::{LatencyWindowConfig, PeriodicLatencyRecorder, RecorderConfig},
    report::{LatencyReport, LogPrinter, Print, PrintAll, ReportCollector},
    storage::{DataReader, DataWriter, Parameters, Storage, StorageFactory},
    time::{SystemClock, Time, TimeUnit},
    utils::{format_rate, format_record_rate, validate_record_size, validate_workers},
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One timed storage operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Completion time in epoch milliseconds
    pub time: i64,
    pub bytes: u64,
    pub events: u64,
    pub latency: i64,
}

/// Which side of the storage a stream measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Writing,
    Reading,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Writing => write!(f, "Writing"),
            Action::Reading => write!(f, "Reading"),
        }
    }
}

/// Validated configuration of one benchmark run
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub driver: DriverKind,
    pub writers: usize,
    pub readers: usize,
    /// Records per worker; `None` when the run is time-bounded
    pub records: Option<u64>,
    pub duration: Option<Duration>,
    pub record_size: usize,
    pub time_unit: TimeUnit,
    pub reporting_interval: Duration,
    pub recorder: RecorderConfig,
    pub driver_options: Vec<(String, String)>,
}

impl BenchmarkConfig {
    /// Create benchmark configuration from CLI arguments
    ///
    /// ## Validation
    /// - At least one worker, record size within limits
    /// - Latency ranges non-empty, percentiles within `[0, 100]` and ascending
    /// - Spill directory defaults to the system temp directory when `--csv`
    ///   is given without `--spill-dir`
    pub fn from_args(args: &Args) -> Result<Self> {
        validate_workers(args.writers, args.readers)?;
        validate_record_size(args.size)?;
        if args.interval.is_zero() {
            anyhow::bail!("Reporting interval must be positive");
        }

        let fractions: Vec<f64> = args.percentiles.iter().map(|p| p / 100.0).collect();

        let window = LatencyWindowConfig {
            total_records_max: args.window_records.unwrap_or(u64::MAX),
            percentile_fractions: fractions.clone(),
            ..LatencyWindowConfig::new(args.min_latency, args.max_window_latency, args.time_unit)
        };
        let total = LatencyWindowConfig {
            percentile_fractions: fractions,
            ..LatencyWindowConfig::new(args.min_latency, args.max_latency, args.time_unit)
        };

        let mut recorder = RecorderConfig::new(window, total);
        recorder.max_map_size_mb = args.max_map_size_mb;
        if args.csv {
            recorder.spill_dir = Some(
                args.spill_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
            );
        }
        recorder.validate().context("Invalid latency configuration")?;

        Ok(Self {
            driver: args.driver,
            writers: args.writers,
            readers: args.readers,
            records: if args.time.is_some() {
                None
            } else {
                Some(args.records)
            },
            duration: args.time,
            record_size: args.size,
            time_unit: args.time_unit,
            reporting_interval: args.interval,
            recorder,
            driver_options: args.options.clone(),
        })
    }
}

/// Single owner of a recorder stack, fed through a channel
pub struct LatencyReporter {
    recorder: Box<dyn PeriodicLatencyRecorder>,
    clock: Arc<dyn Time>,
    interval: Duration,
}

impl LatencyReporter {
    pub fn new(
        recorder: Box<dyn PeriodicLatencyRecorder>,
        clock: Arc<dyn Time>,
        interval: Duration,
    ) -> Self {
        Self {
            recorder,
            clock,
            interval,
        }
    }

    /// Record samples until every sender is dropped, printing every interval,
    /// then print the final totals
    pub async fn run(mut self, mut samples: mpsc::Receiver<Sample>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        self.recorder.start(self.clock.now_millis());
        loop {
            tokio::select! {
                sample = samples.recv() => match sample {
                    Some(s) => self.recorder.record(s.time, s.bytes, s.events, s.latency),
                    None => break,
                },
                _ = ticker.tick() => self.recorder.print(self.clock.now_millis()),
            }
        }
        self.recorder.print_total(self.clock.now_millis());
    }
}

/// Final totals of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkOutcome {
    pub driver: String,
    pub writers: usize,
    pub readers: usize,
    pub record_size: usize,
    pub test_duration: Duration,
    pub writing: Option<LatencyReport>,
    pub reading: Option<LatencyReport>,
}

/// Stream plumbing for one action: the reporter task and its sample sender
struct Stream {
    action: Action,
    sender: mpsc::Sender<Sample>,
    reporter: JoinHandle<()>,
    totals: ReportCollector,
}

/// Benchmark runner for a single storage driver
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    clock: Arc<dyn Time>,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig) -> Self {
        let clock = Arc::new(SystemClock::new(config.time_unit));
        Self { config, clock }
    }

    /// Run the benchmark to completion and return the final totals
    pub async fn run(&self) -> Result<BenchmarkOutcome> {
        let start = Instant::now();
        let mut storage = StorageFactory::create(self.config.driver)?;
        let params = self.parameters(storage.as_mut())?;

        info!(
            "Starting {} benchmark: {} writers, {} readers, {} byte records",
            storage.name(),
            self.config.writers,
            self.config.readers,
            self.config.record_size
        );
        storage
            .open_storage(&params)
            .await
            .with_context(|| format!("Failed to open {} storage", storage.name()))?;

        let result = self.run_workers(storage.as_ref(), &params).await;

        if let Err(e) = storage.close_storage(&params).await {
            warn!("Failed to close {} storage: {}", storage.name(), e);
        }

        let (writing, reading) = result?;
        let outcome = BenchmarkOutcome {
            driver: storage.name().to_string(),
            writers: self.config.writers,
            readers: self.config.readers,
            record_size: self.config.record_size,
            test_duration: start.elapsed(),
            writing,
            reading,
        };
        for report in outcome.writing.iter().chain(outcome.reading.iter()) {
            info!(
                "Throughput: {}, {}",
                format_rate(report.mb_per_sec * defaults::BYTES_PER_MB as f64),
                format_record_rate(report.records_per_sec)
            );
        }
        Ok(outcome)
    }

    fn parameters(&self, storage: &mut dyn Storage) -> Result<Parameters> {
        let mut params = Parameters::new(
            self.config.writers,
            self.config.readers,
            self.config.record_size,
        );
        storage.add_args(&mut params)?;
        for (key, value) in &self.config.driver_options {
            params.set_value(key, value)?;
        }
        storage.parse_args(&params)?;
        Ok(params)
    }

    fn spawn_stream(&self, action: Action) -> Result<Stream> {
        let totals = ReportCollector::new();
        let window_sink: Arc<dyn Print> = Arc::new(LogPrinter::new(action.to_string()));
        let total_sink: Arc<dyn Print> = Arc::new(PrintAll::new(vec![
            Arc::new(LogPrinter::new(format!("Total {}", action))),
            Arc::new(totals.clone()),
        ]));
        let recorder = self.config.recorder.build(window_sink, total_sink)?;

        let (sender, receiver) = mpsc::channel(defaults::SAMPLE_QUEUE_DEPTH);
        let reporter = LatencyReporter::new(
            recorder,
            self.clock.clone(),
            self.config.reporting_interval,
        );
        let reporter = tokio::spawn(reporter.run(receiver));

        Ok(Stream {
            action,
            sender,
            reporter,
            totals,
        })
    }

    async fn run_workers(
        &self,
        storage: &dyn Storage,
        params: &Parameters,
    ) -> Result<(Option<LatencyReport>, Option<LatencyReport>)> {
        let deadline = self.config.duration.map(|d| Instant::now() + d);
        let mut workers: Vec<JoinHandle<Result<()>>> = Vec::new();
        let mut streams = Vec::new();

        if self.config.writers > 0 {
            let stream = self.spawn_stream(Action::Writing)?;
            for id in 0..self.config.writers {
                let writer = storage.create_writer(id, params)?;
                workers.push(tokio::spawn(run_writer(
                    writer,
                    stream.sender.clone(),
                    self.worker_plan(deadline),
                )));
            }
            streams.push(stream);
        }

        if self.config.readers > 0 {
            let stream = self.spawn_stream(Action::Reading)?;
            for id in 0..self.config.readers {
                let reader = storage.create_reader(id, params)?;
                workers.push(tokio::spawn(run_reader(
                    reader,
                    stream.sender.clone(),
                    self.worker_plan(deadline),
                )));
            }
            streams.push(stream);
        }

        let mut first_error = None;
        for worker in workers {
            let outcome = worker
                .await
                .map_err(|e| anyhow!("Worker task panicked: {}", e))
                .and_then(|r| r);
            if let Err(e) = outcome {
                warn!("Worker failed: {:#}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        let mut writing = None;
        let mut reading = None;
        for stream in streams {
            // Dropping the last sender lets the reporter finalize
            drop(stream.sender);
            stream
                .reporter
                .await
                .map_err(|e| anyhow!("{} reporter panicked: {}", stream.action, e))?;
            debug!("{} reporter finished", stream.action);
            let total = stream.totals.last();
            match stream.action {
                Action::Writing => writing = total,
                Action::Reading => reading = total,
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok((writing, reading)),
        }
    }

    fn worker_plan(&self, deadline: Option<Instant>) -> WorkerPlan {
        WorkerPlan {
            records: self.config.records,
            deadline,
            record_size: self.config.record_size,
            time_unit: self.config.time_unit,
            clock: self.clock.clone(),
        }
    }
}

/// How long a worker runs and how it timestamps its samples
struct WorkerPlan {
    records: Option<u64>,
    deadline: Option<Instant>,
    record_size: usize,
    time_unit: TimeUnit,
    clock: Arc<dyn Time>,
}

impl WorkerPlan {
    fn should_continue(&self, done: u64) -> bool {
        if let Some(deadline) = self.deadline {
            return Instant::now() < deadline;
        }
        done < self.records.unwrap_or(defaults::RECORDS)
    }

    fn sample(&self, started: Instant, bytes: usize) -> Sample {
        Sample {
            time: self.clock.now_millis(),
            bytes: bytes as u64,
            events: 1,
            latency: self.time_unit.from_duration(started.elapsed()),
        }
    }
}

async fn run_writer(
    mut writer: Box<dyn DataWriter>,
    samples: mpsc::Sender<Sample>,
    plan: WorkerPlan,
) -> Result<()> {
    let payload = vec![0u8; plan.record_size];
    let mut done = 0;
    while plan.should_continue(done) {
        let started = Instant::now();
        writer.write(&payload).await?;
        if samples.send(plan.sample(started, payload.len())).await.is_err() {
            break;
        }
        done += 1;
        // Keep zero-latency drivers from starving the reporter
        tokio::task::yield_now().await;
    }
    writer.sync().await?;
    writer.close().await
}

async fn run_reader(
    mut reader: Box<dyn DataReader>,
    samples: mpsc::Sender<Sample>,
    plan: WorkerPlan,
) -> Result<()> {
    let mut buf = vec![0u8; plan.record_size];
    let mut done = 0;
    while plan.should_continue(done) {
        let started = Instant::now();
        let Some(bytes) = reader.read(&mut buf).await? else {
            break;
        };
        if samples.send(plan.sample(started, bytes)).await.is_err() {
            break;
        }
        done += 1;
        tokio::task::yield_now().await;
    }
    reader.close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_benchmark_config_creation() {
        let args = Args::parse_from(["sbk", "-w", "2", "-r", "1", "--percentiles", "50", "99.9"]);
        let config = BenchmarkConfig::from_args(&args).unwrap();

        assert_eq!(config.writers, 2);
        assert_eq!(config.readers, 1);
        assert_eq!(config.records, Some(defaults::RECORDS));
        assert_eq!(config.recorder.window.percentile_fractions, vec![0.5, 0.999]);
        assert_eq!(config.recorder.total.high_latency, defaults::MAX_LATENCY);
        assert!(config.recorder.spill_dir.is_none());
    }

    #[test]
    fn test_benchmark_config_time_mode_and_csv() {
        let args = Args::parse_from(["sbk", "-t", "2s", "--csv", "--spill-dir", "/tmp/sbk"]);
        let config = BenchmarkConfig::from_args(&args).unwrap();
        assert_eq!(config.records, None);
        assert_eq!(config.duration, Some(Duration::from_secs(2)));
        assert_eq!(config.recorder.spill_dir, Some(PathBuf::from("/tmp/sbk")));
    }

    #[test]
    fn test_benchmark_config_rejects_bad_input() {
        let args = Args::parse_from(["sbk", "-w", "0"]);
        assert!(BenchmarkConfig::from_args(&args).is_err());

        let args = Args::parse_from(["sbk", "--percentiles", "99", "50"]);
        assert!(BenchmarkConfig::from_args(&args).is_err());

        let args = Args::parse_from(["sbk", "--min-latency", "10", "--max-window-latency", "10"]);
        assert!(BenchmarkConfig::from_args(&args).is_err());
    }

    #[tokio::test]
    async fn test_reporter_owns_recorder_until_senders_drop() {
        let window = LatencyWindowConfig {
            percentile_fractions: vec![0.5],
            ..LatencyWindowConfig::new(0, 1000, TimeUnit::Ms)
        };
        let totals = ReportCollector::new();
        let recorder = RecorderConfig::new(window.clone(), window)
            .build(Arc::new(ReportCollector::new()), Arc::new(totals.clone()))
            .unwrap();
        let reporter = LatencyReporter::new(
            recorder,
            Arc::new(SystemClock::new(TimeUnit::Ms)),
            Duration::from_secs(60),
        );

        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(reporter.run(rx));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        let sample = Sample {
                            time: 0,
                            bytes: 10,
                            events: 1,
                            latency: p * 25 + i,
                        };
                        tx.send(sample).await.unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let total = totals.last().unwrap();
        assert_eq!(total.total_records, 100);
        assert_eq!(total.total_bytes, 1000);
        assert_eq!(total.percentile(0.5), Some(50));
    }
}
