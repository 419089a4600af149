//! Store configuration
//!
//! Settings that have to be fixed before a [`Store`](crate::Store) starts:
//! where snapshots go, how often they are written, and how often expired
//! entries are swept. Unset values disable the corresponding feature.
//!
//! ```
//! use snapkv::StoreConfig;
//! use std::time::Duration;
//!
//! let config = StoreConfig::default()
//!     .with_snapshot_file("store.snapshot.json")
//!     .with_save_interval(Duration::from_secs(5));
//!
//! assert!(config.persistence_enabled());
//! assert_eq!(config.periodic_save_interval(), Some(Duration::from_secs(5)));
//! ```

use crate::storage::DEFAULT_SWEEP_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the snapshot file path.
pub const ENV_SNAPSHOT_FILE: &str = "SNAPKV_SNAPSHOT_FILE";

/// Environment variable holding the save interval in milliseconds.
pub const ENV_SAVE_INTERVAL_MS: &str = "SNAPKV_SAVE_INTERVAL_MS";

/// Environment variable holding the sweep interval in milliseconds.
pub const ENV_SWEEP_INTERVAL_MS: &str = "SNAPKV_SWEEP_INTERVAL_MS";

/// Errors produced while reading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration variable was not a whole number of milliseconds
    #[error("invalid value for {var}: {value:?} (expected milliseconds)")]
    InvalidDuration { var: &'static str, value: String },

    /// The sweeper needs a non-zero period
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Snapshot file (None = persistence disabled)
    pub snapshot_path: Option<PathBuf>,

    /// Time between automatic saves (zero = only the final save on shutdown)
    pub save_interval: Duration,

    /// Time between expiry sweeps (default: 100ms)
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            save_interval: Duration::ZERO,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the snapshot file. An empty path disables persistence.
    pub fn with_snapshot_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.snapshot_path = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        };
        self
    }

    /// Sets the interval between automatic saves.
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Sets the interval between expiry sweeps.
    ///
    /// A zero interval is replaced by the default when the store starts.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// True if a snapshot file is configured.
    pub fn persistence_enabled(&self) -> bool {
        self.snapshot_path.is_some()
    }

    /// The periodic save interval, if periodic saving applies.
    pub fn periodic_save_interval(&self) -> Option<Duration> {
        if self.persistence_enabled() && !self.save_interval.is_zero() {
            Some(self.save_interval)
        } else {
            None
        }
    }

    /// The sweep interval the store actually runs with.
    pub(crate) fn effective_sweep_interval(&self) -> Duration {
        if self.sweep_interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            self.sweep_interval
        }
    }

    /// Reads configuration from `SNAPKV_*` environment variables.
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var: &'static str| lookup(var).filter(|value| !value.trim().is_empty());

        let mut config = Self::default();

        if let Some(path) = read(ENV_SNAPSHOT_FILE) {
            config = config.with_snapshot_file(path.trim());
        }

        if let Some(value) = read(ENV_SAVE_INTERVAL_MS) {
            config.save_interval = parse_millis(ENV_SAVE_INTERVAL_MS, &value)?;
        }

        if let Some(value) = read(ENV_SWEEP_INTERVAL_MS) {
            let interval = parse_millis(ENV_SWEEP_INTERVAL_MS, &value)?;
            if interval.is_zero() {
                return Err(ConfigError::ZeroSweepInterval);
            }
            config.sweep_interval = interval;
        }

        Ok(config)
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidDuration {
            var,
            value: value.to_string(),
        })
}
