//! Turning an address into a connected worker

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use vecshard_core::{Error, Result};
use vecshard_worker::SearchWorker;

use crate::remote::RemoteWorker;
use crate::transport::InProcessTransport;
use crate::worker::Worker;

/// Connects to the worker listening at an address.
pub trait WorkerConnector: Send + Sync {
    /// Connect, failing with `WorkerUnreachable` if nothing answers.
    fn connect(&self, address: &str, timeout: Duration) -> Result<Arc<dyn Worker>>;
}

/// Connector for workers running in this process, keyed by address.
#[derive(Default)]
pub struct LocalConnector {
    transports: RwLock<HashMap<String, Arc<InProcessTransport>>>,
}

impl LocalConnector {
    /// Create a connector with no workers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `worker` reachable at `address`. Returns the transport so the
    /// caller can take the worker offline or slow it down.
    pub fn register(
        &self,
        address: impl Into<String>,
        worker: Arc<dyn SearchWorker>,
    ) -> Arc<InProcessTransport> {
        let address = address.into();
        let transport = Arc::new(InProcessTransport::new(address.clone(), worker));
        self.transports
            .write()
            .insert(address, Arc::clone(&transport));
        transport
    }

    /// Transport registered for `address`.
    pub fn transport(&self, address: &str) -> Option<Arc<InProcessTransport>> {
        self.transports.read().get(address).cloned()
    }
}

impl WorkerConnector for LocalConnector {
    fn connect(&self, address: &str, timeout: Duration) -> Result<Arc<dyn Worker>> {
        let transport = self
            .transport(address)
            .ok_or_else(|| Error::unreachable(address, "no worker listening"))?;
        let worker = RemoteWorker::connect(transport, timeout)?;
        Ok(Arc::new(worker))
    }
}
