//! Configuration for the data layer
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DataLayerError, Result};

/// Main configuration for a region directory
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory holding one subdirectory per hosted region
    /// Internal structure:
    ///   {base_path}/
    ///     └── {space}-{subspace}-{prefix}-{mask}/
    ///           ├── segment_000001.log
    ///           └── segment_000002.log
    pub base_path: PathBuf,

    // -------------------------------------------------------------------------
    // Maintenance Configuration
    // -------------------------------------------------------------------------
    /// Max records written per scheduled flush of one disk
    pub flush_limit: usize,

    /// Max records written by a foreground trickle
    pub trickle_limit: usize,

    /// Minimum time between two preallocation passes
    pub preallocate_interval: Duration,

    /// Minimum time between two opportunistic I/O passes
    pub optimism_interval: Duration,

    /// How long the scheduler idles after an iteration that did nothing
    pub idle_sleep: Duration,

    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Size of each log segment file (in bytes)
    pub segment_capacity: u64,

    /// Max records a single segment may hold
    pub segment_max_records: usize,

    /// Max acknowledged-but-unlogged records per disk before puts are refused
    pub max_pending: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./datalayer_data"),
            flush_limit: 10_000,
            trickle_limit: 1_000,
            preallocate_interval: Duration::from_millis(500),
            optimism_interval: Duration::from_millis(500),
            idle_sleep: Duration::from_millis(100),
            segment_capacity: 64 * 1024 * 1024, // 64 MB
            segment_max_records: 65_536,
            max_pending: 1 << 20,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings under which the directory could never make progress
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("flush_limit", self.flush_limit),
            ("trickle_limit", self.trickle_limit),
            ("segment_max_records", self.segment_max_records),
            ("max_pending", self.max_pending),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(DataLayerError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.segment_capacity == 0 {
            return Err(DataLayerError::Config(
                "segment_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the base path (root for all region directories)
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_path = path.into();
        self
    }

    /// Set the per-disk record budget of a scheduled flush
    pub fn flush_limit(mut self, limit: usize) -> Self {
        self.config.flush_limit = limit;
        self
    }

    /// Set the record budget of a foreground trickle
    pub fn trickle_limit(mut self, limit: usize) -> Self {
        self.config.trickle_limit = limit;
        self
    }

    /// Set the preallocation cadence
    pub fn preallocate_interval(mut self, interval: Duration) -> Self {
        self.config.preallocate_interval = interval;
        self
    }

    /// Set the opportunistic I/O cadence
    pub fn optimism_interval(mut self, interval: Duration) -> Self {
        self.config.optimism_interval = interval;
        self
    }

    /// Set the idle sleep of the maintenance scheduler
    pub fn idle_sleep(mut self, sleep: Duration) -> Self {
        self.config.idle_sleep = sleep;
        self
    }

    /// Set the log segment size (in bytes)
    pub fn segment_capacity(mut self, bytes: u64) -> Self {
        self.config.segment_capacity = bytes;
        self
    }

    /// Set the max record count per segment
    pub fn segment_max_records(mut self, count: usize) -> Self {
        self.config.segment_max_records = count;
        self
    }

    /// Set the pending-record ceiling per disk
    pub fn max_pending(mut self, count: usize) -> Self {
        self.config.max_pending = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
