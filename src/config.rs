use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoordError, Result};

/// Run configuration with all tuning parameters.
///
/// Durations serialize in serde's standard `{secs, nanos}` form; the builder
/// is the usual construction path for embedders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    // Worker pool configuration
    /// Number of concurrent workers (one automation session each)
    pub workers: usize,
    /// Delay between launching consecutive worker sessions
    pub launch_stagger: Duration,

    // Task source configuration
    /// Directory scanned for `*.zip` artifacts at run start
    pub source_dir: PathBuf,

    // Completion store configuration
    /// Path of the on-disk completion database
    pub store_path: PathBuf,

    // Upload settle configuration
    /// Base dead time after an artifact transfer begins
    pub upload_wait_base: Duration,
    /// Additional settle seconds per megabyte of artifact size
    pub upload_wait_per_mb: f64,

    // Retry configuration
    /// Submission attempts per task before giving up
    pub max_attempts: u8,
    /// Linear backoff step: attempt n waits `n * backoff_step` before retrying
    pub backoff_step: Duration,
    /// Hard limit on a single submit attempt
    pub submit_timeout: Duration,

    // Turn protocol configuration
    /// Poll interval while waiting for the round-robin turn token
    pub turn_poll_interval: Duration,
    /// How long workers wait at the startup barrier before proceeding anyway
    pub barrier_timeout: Duration,

    // Submission mode
    /// Submit automatically; when false, each task passes through the
    /// manual-confirmation gate first
    pub auto_submit: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            launch_stagger: Duration::from_secs(10),
            source_dir: PathBuf::from("uploads"),
            store_path: PathBuf::from("progress.db"),
            upload_wait_base: Duration::from_secs(30),
            upload_wait_per_mb: 0.75,
            max_attempts: 3,
            backoff_step: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(30),
            turn_poll_interval: Duration::from_secs(1),
            barrier_timeout: Duration::from_secs(10),
            auto_submit: true,
        }
    }
}

impl RunConfig {
    /// Create a new builder for RunConfig
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::new()
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&raw)?;
        config
            .validate()
            .map_err(CoordError::InvalidConfiguration)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if self.upload_wait_per_mb < 0.0 {
            return Err("upload_wait_per_mb cannot be negative".to_string());
        }
        if self.turn_poll_interval.is_zero() {
            return Err("turn_poll_interval must be greater than zero".to_string());
        }
        if self.submit_timeout.is_zero() {
            return Err("submit_timeout must be greater than zero".to_string());
        }
        if self.source_dir.as_os_str().is_empty() {
            return Err("source_dir must be set".to_string());
        }
        if self.store_path.as_os_str().is_empty() {
            return Err("store_path must be set".to_string());
        }
        Ok(())
    }

    /// Configuration suited to fast development/test cycles
    pub fn development() -> Self {
        Self {
            launch_stagger: Duration::from_millis(10),
            upload_wait_base: Duration::from_millis(10),
            upload_wait_per_mb: 0.0,
            backoff_step: Duration::from_millis(10),
            submit_timeout: Duration::from_secs(5),
            turn_poll_interval: Duration::from_millis(10),
            barrier_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }
}

/// Builder for RunConfig
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
        }
    }

    /// Set the worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the artifact source directory
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.source_dir = dir.into();
        self
    }

    /// Set the completion store path
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = path.into();
        self
    }

    /// Set the upload settle coefficients
    pub fn settle(mut self, base: Duration, per_mb_secs: f64) -> Self {
        self.config.upload_wait_base = base;
        self.config.upload_wait_per_mb = per_mb_secs;
        self
    }

    /// Set the retry budget and linear backoff step
    pub fn retries(mut self, max_attempts: u8, backoff_step: Duration) -> Self {
        self.config.max_attempts = max_attempts;
        self.config.backoff_step = backoff_step;
        self
    }

    /// Set the per-attempt submission timeout
    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    /// Set the turn-wait poll interval
    pub fn turn_poll_interval(mut self, interval: Duration) -> Self {
        self.config.turn_poll_interval = interval;
        self
    }

    /// Set the startup barrier timeout
    pub fn barrier_timeout(mut self, timeout: Duration) -> Self {
        self.config.barrier_timeout = timeout;
        self
    }

    /// Set the stagger between worker session launches
    pub fn launch_stagger(mut self, stagger: Duration) -> Self {
        self.config.launch_stagger = stagger;
        self
    }

    /// Enable or disable automatic submission
    pub fn auto_submit(mut self, auto: bool) -> Self {
        self.config.auto_submit = auto;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<RunConfig> {
        self.config
            .validate()
            .map_err(CoordError::InvalidConfiguration)?;
        Ok(self.config)
    }
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
