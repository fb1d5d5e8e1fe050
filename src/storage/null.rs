//! No-op storage driver.
//!
//! Writes and reads complete immediately without touching any storage, so a
//! run against this driver measures the overhead of the harness itself. The
//! `n` option adds a busy loop of `n` iterations to every write.

use super::{DataReader, DataWriter, Parameters, Storage};
use anyhow::{Context, Result};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct Null {
    n: u64,
}

impl Null {
    pub fn new() -> Self {
        Self::default()
    }

    /// Busy-loop iterations per write
    pub fn loop_count(&self) -> u64 {
        self.n
    }
}

#[async_trait]
impl Storage for Null {
    fn name(&self) -> &'static str {
        "Null"
    }

    fn add_args(&self, params: &mut Parameters) -> Result<()> {
        params.add_option(
            "n",
            true,
            &format!("iteration loop max value for writers, default value: {}", self.n),
        )
    }

    fn parse_args(&mut self, params: &Parameters) -> Result<()> {
        let value = params.option_value("n", "0");
        self.n = value
            .parse()
            .with_context(|| format!("Invalid value for option 'n': {}", value))?;
        Ok(())
    }

    async fn open_storage(&mut self, _params: &Parameters) -> Result<()> {
        Ok(())
    }

    async fn close_storage(&mut self, _params: &Parameters) -> Result<()> {
        Ok(())
    }

    fn create_writer(&self, _id: usize, _params: &Parameters) -> Result<Box<dyn DataWriter>> {
        Ok(Box::new(NullWriter { n: self.n }))
    }

    fn create_reader(&self, _id: usize, _params: &Parameters) -> Result<Box<dyn DataReader>> {
        Ok(Box::new(NullReader))
    }
}

pub struct NullWriter {
    n: u64,
}

#[async_trait]
impl DataWriter for NullWriter {
    async fn write(&mut self, _data: &[u8]) -> Result<()> {
        for i in 0..self.n {
            std::hint::black_box(i);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct NullReader;

#[async_trait]
impl DataReader for NullReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        Ok(Some(buf.len()))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
