//! # Storage Driver Capability Set
//!
//! The latency core never talks to a storage system directly. A driver
//! implements [`Storage`] and hands out [`DataWriter`] / [`DataReader`]
//! instances per worker; the benchmark runner times each call and feeds the
//! resulting samples to the recorders.
//!
//! Drivers declare their own options through [`Parameters::add_option`] and
//! read them back in [`Storage::parse_args`]. Option values come from the
//! command line as `key=value` pairs.

use crate::cli::DriverKind;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

pub mod null;

pub use null::Null;

/// A driver-declared option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: String,
    pub has_arg: bool,
    pub description: String,
}

/// Benchmark parameters plus the key/value option set shared with drivers
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    pub writers: usize,
    pub readers: usize,
    pub record_size: usize,
    options: BTreeMap<String, OptionSpec>,
    values: HashMap<String, String>,
}

impl Parameters {
    pub fn new(writers: usize, readers: usize, record_size: usize) -> Self {
        Self {
            writers,
            readers,
            record_size,
            ..Self::default()
        }
    }

    /// Declare a driver option; names must be unique
    pub fn add_option(&mut self, name: &str, has_arg: bool, description: &str) -> Result<()> {
        if self.options.contains_key(name) {
            bail!("Option '{}' is already defined", name);
        }
        self.options.insert(
            name.to_string(),
            OptionSpec {
                name: name.to_string(),
                has_arg,
                description: description.to_string(),
            },
        );
        Ok(())
    }

    /// Assign a value to a declared option
    pub fn set_value(&mut self, name: &str, value: &str) -> Result<()> {
        if !self.options.contains_key(name) {
            let known: Vec<String> = self
                .options()
                .map(|o| format!("{} ({})", o.name, o.description))
                .collect();
            bail!(
                "Unknown driver option '{}'; known options: {}",
                name,
                known.join(", ")
            );
        }
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Value of `name`, or `default` when it was not given
    pub fn option_value(&self, name: &str, default: &str) -> String {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Declared options in name order
    pub fn options(&self) -> impl Iterator<Item = &OptionSpec> {
        self.options.values()
    }
}

/// A storage system under benchmark
#[async_trait]
pub trait Storage: Send + Sync {
    /// Driver name for identification in logs and results
    fn name(&self) -> &'static str;

    /// Declare the driver's options
    fn add_args(&self, params: &mut Parameters) -> Result<()>;

    /// Read the driver's option values
    fn parse_args(&mut self, params: &Parameters) -> Result<()>;

    async fn open_storage(&mut self, params: &Parameters) -> Result<()>;

    async fn close_storage(&mut self, params: &Parameters) -> Result<()>;

    fn create_writer(&self, id: usize, params: &Parameters) -> Result<Box<dyn DataWriter>>;

    fn create_reader(&self, id: usize, params: &Parameters) -> Result<Box<dyn DataReader>>;
}

/// Per-worker write handle
#[async_trait]
pub trait DataWriter: Send {
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Flush buffered writes; drivers without buffering need not override
    async fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()>;
}

/// Per-worker read handle
#[async_trait]
pub trait DataReader: Send {
    /// Read one record into `buf`; `None` means the stream has ended
    async fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    async fn close(&mut self) -> Result<()>;
}

/// Factory for the built-in drivers
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(kind: DriverKind) -> Result<Box<dyn Storage>> {
        match kind {
            DriverKind::Null => Ok(Box::new(Null::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_options() {
        let mut params = Parameters::new(2, 1, 512);
        params.add_option("n", true, "loop count").unwrap();
        assert!(params.add_option("n", true, "again").is_err());

        assert_eq!(params.option_value("n", "0"), "0");
        params.set_value("n", "42").unwrap();
        assert_eq!(params.option_value("n", "0"), "42");
        assert_eq!(params.options().count(), 1);
        assert_eq!(params.writers, 2);
    }

    #[test]
    fn test_unknown_option_lists_declared_options() {
        let mut params = Parameters::new(1, 0, 16);
        params.add_option("n", true, "loop count").unwrap();
        params.add_option("path", true, "target file").unwrap();

        let err = params.set_value("missing", "1").unwrap_err().to_string();
        assert!(err.contains("'missing'"), "{}", err);
        assert!(err.contains("n (loop count), path (target file)"), "{}", err);
    }

    #[test]
    fn test_factory_creates_null() {
        let storage = StorageFactory::create(DriverKind::Null).unwrap();
        assert_eq!(storage.name(), "Null");
    }
}
