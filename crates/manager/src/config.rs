//! Manager configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vecshard_core::limits::{
    DEFAULT_HEALTH_CHECK_TIMEOUT, DEFAULT_LIVENESS_INTERVAL, DEFAULT_MAILBOX_CAPACITY,
    DEFAULT_PROBE_INTERVAL, DEFAULT_SHARD_CAPACITY,
};
use vecshard_core::{Error, Result};
use vecshard_storage::DriverConfig;

use crate::shard_manager::ShardSettings;
use crate::worker_manager::WorkerManagerSettings;

/// Manager configuration, loaded from JSON.
///
/// `driver` and `workers` are required; everything else has a default.
///
/// # Example
///
/// ```json
/// {
///   "driver": { "type": "local", "path": "/var/lib/vecshard" },
///   "workers": ["local://worker-a", "local://worker-b"],
///   "shard_capacity": 100000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Where metadata is persisted
    pub driver: DriverConfig,
    /// Worker addresses to connect at startup
    pub workers: Vec<String>,
    /// Capacity of every new shard
    #[serde(default = "default_shard_capacity")]
    pub shard_capacity: u64,
    /// Milliseconds between health checks of one worker
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,
    /// Health check timeout in milliseconds
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
    /// Milliseconds between reconnect attempts to unreachable workers
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    /// Bound of each shard actor's mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_shard_capacity() -> u64 {
    DEFAULT_SHARD_CAPACITY
}

fn default_liveness_interval_ms() -> u64 {
    DEFAULT_LIVENESS_INTERVAL.as_millis() as u64
}

fn default_health_check_timeout_ms() -> u64 {
    DEFAULT_HEALTH_CHECK_TIMEOUT.as_millis() as u64
}

fn default_probe_interval_ms() -> u64 {
    DEFAULT_PROBE_INTERVAL.as_millis() as u64
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl ManagerConfig {
    /// In-memory driver, the given workers, default timings.
    pub fn new(workers: Vec<String>) -> Self {
        ManagerConfig {
            driver: DriverConfig::default(),
            workers,
            shard_capacity: default_shard_capacity(),
            liveness_interval_ms: default_liveness_interval_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }

    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("manager config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Reject values no manager can run with.
    pub fn validate(&self) -> Result<()> {
        if self.shard_capacity == 0 {
            return Err(Error::Config("shard_capacity must be positive".into()));
        }
        if self.mailbox_capacity == 0 {
            return Err(Error::Config("mailbox_capacity must be positive".into()));
        }
        if self.liveness_interval_ms == 0 || self.probe_interval_ms == 0 {
            return Err(Error::Config("intervals must be positive".into()));
        }
        Ok(())
    }

    /// Settings for the worker manager.
    pub fn worker_settings(&self) -> WorkerManagerSettings {
        WorkerManagerSettings {
            addresses: self.workers.clone(),
            liveness_interval: Duration::from_millis(self.liveness_interval_ms),
            health_check_timeout: Duration::from_millis(self.health_check_timeout_ms),
            probe_interval: Duration::from_millis(self.probe_interval_ms),
        }
    }

    /// Settings for the shard directory.
    pub fn shard_settings(&self) -> ShardSettings {
        ShardSettings {
            shard_capacity: self.shard_capacity,
            mailbox_capacity: self.mailbox_capacity,
        }
    }
}
