//! Worker registry, liveness monitoring and placement
//!
//! The [`WorkerManager`] connects to every known worker address, keeps the
//! connected workers in attach order, and runs one [`PeriodicTask`] per
//! worker that health-checks it and flips its liveness flag. Workers are
//! never removed: a dead worker keeps its shards and is only skipped by
//! placement. Addresses that could not be reached at startup are retried
//! by a background probe until they connect.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use vecshard_concurrency::PeriodicTask;
use vecshard_core::limits::{
    DEFAULT_HEALTH_CHECK_TIMEOUT, DEFAULT_LIVENESS_INTERVAL, DEFAULT_PROBE_INTERVAL,
};
use vecshard_core::{Error, Result, WorkerItem};
use vecshard_storage::Driver;

use crate::connector::WorkerConnector;
use crate::worker::Worker;

/// Timing and addresses used by the worker manager.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerManagerSettings {
    /// Configured worker addresses
    pub addresses: Vec<String>,
    /// Time between health checks of one worker
    pub liveness_interval: Duration,
    /// Health check timeout
    pub health_check_timeout: Duration,
    /// Time between connection attempts to unreachable addresses
    pub probe_interval: Duration,
}

impl Default for WorkerManagerSettings {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Connected workers in attach order, shared with the shard actors.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<Vec<Arc<dyn Worker>>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker. Returns false if its id is already registered.
    pub fn insert(&self, worker: Arc<dyn Worker>) -> bool {
        let mut workers = self.workers.write();
        if workers.iter().any(|w| w.worker_id() == worker.worker_id()) {
            return false;
        }
        workers.push(worker);
        true
    }

    /// Look up a worker by id.
    pub fn get(&self, worker_id: &str) -> Option<Arc<dyn Worker>> {
        self.workers
            .read()
            .iter()
            .find(|w| w.worker_id() == worker_id)
            .cloned()
    }

    /// True if a worker was attached from `address`.
    pub fn contains_address(&self, address: &str) -> bool {
        self.workers.read().iter().any(|w| w.address() == address)
    }

    /// Every worker, in attach order.
    pub fn list(&self) -> Vec<Arc<dyn Worker>> {
        self.workers.read().clone()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    /// True if no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live worker with the most free space that can hold a shard of
    /// `capacity` features; ties go to the worker attached first.
    /// `NoWorkerAvailable` if no live worker has that much room.
    pub fn find_writable(&self, capacity: u64) -> Result<Arc<dyn Worker>> {
        let required = capacity.max(1);
        let workers = self.workers.read();
        let mut best: Option<(&Arc<dyn Worker>, u64)> = None;
        for worker in workers.iter().filter(|w| w.is_live()) {
            let free = worker.free_space();
            if free < required {
                continue;
            }
            match best {
                Some((_, best_free)) if free <= best_free => {}
                _ => best = Some((worker, free)),
            }
        }
        best.map(|(worker, _)| Arc::clone(worker))
            .ok_or(Error::NoWorkerAvailable)
    }
}

struct Inner {
    settings: WorkerManagerSettings,
    driver: Arc<dyn Driver>,
    connector: Arc<dyn WorkerConnector>,
    registry: Arc<WorkerRegistry>,
    monitors: Mutex<Vec<PeriodicTask>>,
}

impl Inner {
    fn connect(&self, address: &str) -> Result<Arc<dyn Worker>> {
        let worker = self
            .connector
            .connect(address, self.settings.health_check_timeout)?;
        self.attach(Arc::clone(&worker))?;
        Ok(worker)
    }

    fn attach(&self, worker: Arc<dyn Worker>) -> Result<()> {
        if !self.registry.insert(Arc::clone(&worker)) {
            warn!(target: "vecshard::workers", worker_id = %worker.worker_id(), "worker already attached");
            return Ok(());
        }

        self.driver.create_worker(&WorkerItem {
            worker_id: worker.worker_id().to_string(),
            address: worker.address().to_string(),
            capacity: worker.capacity(),
        })?;

        let monitor = spawn_liveness_monitor(
            Arc::clone(&worker),
            self.settings.liveness_interval,
            self.settings.health_check_timeout,
        )?;
        self.monitors.lock().push(monitor);

        info!(
            target: "vecshard::workers",
            worker_id = %worker.worker_id(),
            address = %worker.address(),
            free_space = worker.free_space(),
            "worker attached"
        );
        Ok(())
    }
}

fn spawn_liveness_monitor(
    worker: Arc<dyn Worker>,
    interval: Duration,
    timeout: Duration,
) -> Result<PeriodicTask> {
    let name = format!("vecshard-live-{}", short_id(worker.worker_id()));
    let task = PeriodicTask::spawn(name, interval, move || {
        match worker.health_check(timeout) {
            Ok(_) => {
                if !worker.is_live() {
                    info!(target: "vecshard::workers", worker_id = %worker.worker_id(), "worker is back");
                    worker.set_live(true);
                }
            }
            Err(e) => {
                if worker.is_live() {
                    warn!(target: "vecshard::workers", worker_id = %worker.worker_id(), error = %e, "worker health check failed");
                    worker.set_live(false);
                }
            }
        }
        ControlFlow::Continue(())
    })?;
    Ok(task)
}

fn short_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}

/// Owns the worker registry and its background loops.
pub struct WorkerManager {
    inner: Arc<Inner>,
    pending: Arc<Mutex<Vec<String>>>,
    probe: Mutex<Option<PeriodicTask>>,
}

impl WorkerManager {
    /// Create a manager with an empty registry.
    pub fn new(
        settings: WorkerManagerSettings,
        driver: Arc<dyn Driver>,
        connector: Arc<dyn WorkerConnector>,
    ) -> Self {
        WorkerManager {
            inner: Arc::new(Inner {
                settings,
                driver,
                connector,
                registry: Arc::new(WorkerRegistry::new()),
                monitors: Mutex::new(Vec::new()),
            }),
            pending: Arc::new(Mutex::new(Vec::new())),
            probe: Mutex::new(None),
        }
    }

    /// The shared registry.
    pub fn registry(&self) -> Arc<WorkerRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Connect persisted and configured worker addresses.
    ///
    /// Unreachable addresses do not fail the call: they are handed to a
    /// background probe. Returns how many workers connected now.
    pub fn load_known_workers(&self) -> Result<usize> {
        let mut addresses: Vec<String> = self
            .inner
            .driver
            .list_workers()?
            .into_iter()
            .map(|w| w.address)
            .collect();
        for address in &self.inner.settings.addresses {
            if !addresses.contains(address) {
                addresses.push(address.clone());
            }
        }

        let mut connected = 0;
        let mut unreachable = Vec::new();
        for address in addresses {
            if self.inner.registry.contains_address(&address) {
                continue;
            }
            match self.inner.connect(&address) {
                Ok(_) => connected += 1,
                Err(e) if e.is_retryable() => {
                    warn!(target: "vecshard::workers", address = %address, error = %e, "worker unreachable, will probe");
                    unreachable.push(address);
                }
                Err(e) => return Err(e),
            }
        }

        if !unreachable.is_empty() {
            self.pending.lock().extend(unreachable);
            self.start_probe()?;
        }
        info!(target: "vecshard::workers", connected, "known workers loaded");
        Ok(connected)
    }

    fn start_probe(&self) -> Result<()> {
        let mut probe = self.probe.lock();
        if probe.as_ref().map_or(false, |task| !task.is_finished()) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let pending = Arc::clone(&self.pending);
        let interval = self.inner.settings.probe_interval;
        let task = PeriodicTask::spawn("vecshard-probe", interval, move || {
            let mut pending = pending.lock();
            pending.retain(|address| match inner.connect(address) {
                Ok(_) => {
                    info!(target: "vecshard::workers", address = %address, "probed worker connected");
                    false
                }
                Err(e) => {
                    debug!(target: "vecshard::workers", address = %address, error = %e, "probe failed");
                    true
                }
            });
            if pending.is_empty() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        *probe = Some(task);
        Ok(())
    }

    /// Connect the worker at `address` now.
    pub fn attach_address(&self, address: &str) -> Result<Arc<dyn Worker>> {
        self.inner.connect(address)
    }

    /// Register an already connected worker.
    pub fn attach(&self, worker: Arc<dyn Worker>) -> Result<()> {
        self.inner.attach(worker)
    }

    /// Addresses still waiting for the probe.
    pub fn pending_addresses(&self) -> Vec<String> {
        self.pending.lock().clone()
    }

    /// Look up a worker. `WorkerNotFound` if it never attached.
    pub fn get_worker(&self, worker_id: &str) -> Result<Arc<dyn Worker>> {
        self.inner
            .registry
            .get(worker_id)
            .ok_or_else(|| Error::WorkerNotFound {
                worker_id: worker_id.to_string(),
            })
    }

    /// Every worker, in attach order.
    pub fn list_workers(&self) -> Vec<Arc<dyn Worker>> {
        self.inner.registry.list()
    }

    /// Placement target for a shard of `capacity` features.
    pub fn find_writable_worker(&self, capacity: u64) -> Result<Arc<dyn Worker>> {
        self.inner.registry.find_writable(capacity)
    }

    /// Stop the probe and every liveness monitor, joining their threads.
    pub fn stop(&self) {
        if let Some(probe) = self.probe.lock().take() {
            probe.stop();
        }
        let monitors: Vec<PeriodicTask> = self.inner.monitors.lock().drain(..).collect();
        for monitor in &monitors {
            monitor.stop();
        }
        debug!(target: "vecshard::workers", monitors = monitors.len(), "worker manager stopped");
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        self.stop();
    }
}
