//! Worker configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use vecshard_core::limits::{
    DEFAULT_LOAD_PAGE_SIZE, DEFAULT_MAILBOX_CAPACITY, DEFAULT_WORKER_CAPACITY,
};
use vecshard_core::{Error, Result};
use vecshard_storage::DriverConfig;

/// Worker configuration, loaded from JSON.
///
/// # Example
///
/// ```json
/// {
///   "driver": { "type": "local", "path": "/var/lib/vecshard" },
///   "worker_id": "worker-a",
///   "capacity": 1000000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Where features are persisted (required)
    pub driver: DriverConfig,
    /// Fixed worker id; a random UUID is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Advertised capacity in features
    #[serde(default = "default_capacity")]
    pub capacity: u64,
    /// Page size used when loading a shard from the driver
    #[serde(default = "default_load_page_size")]
    pub load_page_size: u64,
    /// Bound of each shard actor's mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_capacity() -> u64 {
    DEFAULT_WORKER_CAPACITY
}

fn default_load_page_size() -> u64 {
    DEFAULT_LOAD_PAGE_SIZE
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            worker_id: None,
            capacity: default_capacity(),
            load_page_size: default_load_page_size(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

impl WorkerConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("worker config: {}", e)))
    }

    /// Read and parse a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }
}
