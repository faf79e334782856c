//! Driver selection

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use vecshard_core::Result;

use crate::driver::Driver;
use crate::local::LocalDriver;
use crate::memory::MemoryDriver;

/// Which driver to open, tagged by `type`.
///
/// # Example
///
/// ```json
/// { "type": "local", "path": "/var/lib/vecshard" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverConfig {
    /// In-process, non-persistent
    Memory,
    /// Directory on the local filesystem
    Local {
        /// Root directory (created if missing)
        path: PathBuf,
    },
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::Memory
    }
}

/// Open the driver described by `config`.
pub fn open_driver(config: &DriverConfig) -> Result<Arc<dyn Driver>> {
    match config {
        DriverConfig::Memory => {
            info!(target: "vecshard::driver", "opening memory driver");
            Ok(Arc::new(MemoryDriver::new()))
        }
        DriverConfig::Local { path } => {
            info!(target: "vecshard::driver", path = %path.display(), "opening local driver");
            Ok(Arc::new(LocalDriver::open(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_config() {
        let memory: DriverConfig = serde_json::from_str(r#"{"type": "memory"}"#).unwrap();
        assert_eq!(memory, DriverConfig::Memory);

        let local: DriverConfig =
            serde_json::from_str(r#"{"type": "local", "path": "/tmp/vs"}"#).unwrap();
        assert_eq!(
            local,
            DriverConfig::Local {
                path: PathBuf::from("/tmp/vs")
            }
        );
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let parsed: std::result::Result<DriverConfig, _> =
            serde_json::from_str(r#"{"type": "sqlite", "path": "x.db"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_open_local_driver() {
        let dir = tempfile::tempdir().unwrap();
        let driver = open_driver(&DriverConfig::Local {
            path: dir.path().join("store"),
        })
        .unwrap();
        assert!(driver.list_dbs().unwrap().is_empty());
        assert!(dir.path().join("store").join("meta").exists());
    }
}
