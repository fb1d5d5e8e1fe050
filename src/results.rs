//! # Result Output
//!
//! Writes the final totals of a run as pretty-printed JSON, wrapped with
//! enough metadata (version, timestamp, host) to compare runs later.

use crate::benchmark::{BenchmarkConfig, BenchmarkOutcome};
use crate::time::TimeUnit;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Latency configuration the run was measured with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub records: Option<u64>,
    pub duration: Option<std::time::Duration>,
    pub time_unit: TimeUnit,
    pub min_latency: i64,
    pub max_window_latency: i64,
    pub max_latency: i64,
    pub percentiles: Vec<f64>,
    pub max_map_size_mb: u64,
    pub spill_to_csv: bool,
}

impl TestConfiguration {
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        let recorder = &config.recorder;
        Self {
            records: config.records,
            duration: config.duration,
            time_unit: config.time_unit,
            min_latency: recorder.window.low_latency,
            max_window_latency: recorder.window.high_latency,
            max_latency: recorder.total.high_latency,
            percentiles: recorder.total.percentile_fractions.clone(),
            max_map_size_mb: recorder.max_map_size_mb,
            spill_to_csv: recorder.spill_dir.is_some(),
        }
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub benchmark_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub system_info: SystemInfo,
}

/// Document written to the output file
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalResults {
    pub metadata: ResultsMetadata,
    pub test_config: TestConfiguration,
    pub results: BenchmarkOutcome,
}

/// Writes final results to a JSON file
pub struct ResultsWriter {
    output_file: PathBuf,
}

impl ResultsWriter {
    pub fn new(output_file: &Path) -> Self {
        Self {
            output_file: output_file.to_path_buf(),
        }
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn write(&self, config: &BenchmarkConfig, outcome: &BenchmarkOutcome) -> Result<()> {
        let results = FinalResults {
            metadata: ResultsMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                system_info: SystemInfo::default(),
            },
            test_config: TestConfiguration::from_config(config),
            results: outcome.clone(),
        };

        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write results to {:?}", self.output_file))?;

        info!("Results written to: {:?}", self.output_file);
        Ok(())
    }
}
