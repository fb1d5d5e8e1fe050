//! # Time Source
//!
//! The recorders never read a clock themselves. They are handed "now" as
//! epoch milliseconds and they label latency values with a [`TimeUnit`].
//! This module provides both pieces: the unit enumeration used for
//! latency values and the [`Time`] trait that the benchmark runner uses
//! to timestamp samples.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unit in which latency values are recorded and reported
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Milliseconds
    #[clap(name = "ms")]
    Ms,

    /// Microseconds
    #[clap(name = "us")]
    Us,

    /// Nanoseconds
    #[clap(name = "ns")]
    Ns,
}

impl TimeUnit {
    /// Upper-case label used in spill file headers and report lines
    pub fn name(&self) -> &'static str {
        match self {
            TimeUnit::Ms => "MS",
            TimeUnit::Us => "US",
            TimeUnit::Ns => "NS",
        }
    }

    /// Short lower-case suffix for human-readable output
    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
        }
    }

    /// Convert a measured duration into a latency value in this unit
    ///
    /// Saturates at `i64::MAX` rather than wrapping for absurdly long
    /// durations.
    pub fn from_duration(&self, duration: Duration) -> i64 {
        let value = match self {
            TimeUnit::Ms => duration.as_millis(),
            TimeUnit::Us => duration.as_micros(),
            TimeUnit::Ns => duration.as_nanos(),
        };
        i64::try_from(value).unwrap_or(i64::MAX)
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Source of "now" and of the configured latency unit
pub trait Time: Send + Sync {
    /// Current wall-clock time in epoch milliseconds
    fn now_millis(&self) -> i64;

    /// Unit in which latencies are expressed
    fn time_unit(&self) -> TimeUnit;
}

/// [`Time`] implementation backed by the system clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    unit: TimeUnit,
}

impl SystemClock {
    pub fn new(unit: TimeUnit) -> Self {
        Self { unit }
    }
}

impl Time for SystemClock {
    fn now_millis(&self) -> i64 {
        // A clock before the epoch reads as 0 rather than panicking
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        i64::try_from(millis).unwrap_or(i64::MAX)
    }

    fn time_unit(&self) -> TimeUnit {
        self.unit
    }
}
