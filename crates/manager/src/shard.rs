//! Manager-side shard actor
//!
//! Each [`Shard`] serializes every operation on one `DbShard` through its own
//! actor thread: capacity checks, the forward to the worker and the update
//! of `used` happen as one step, so concurrent writers can never overshoot
//! the capacity or lose an increment.
//!
//! The shard record is shared with readers through an `RwLock` but written
//! only from the actor. The assigned worker is held by id and resolved in
//! the shared [`WorkerRegistry`] on every call.
//!
//! Lifecycle: `Created → Running → Closed → Stopped`. Closing stops the actor
//! loop; a closed shard still answers searches and removals, which then run
//! inline on the caller's thread against the parked handler.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use vecshard_concurrency::{Actor, ActorError, Handler};
use vecshard_core::{DbShard, Error, Feature, FeatureDbItem, FeatureSearchItem, Result};
use vecshard_storage::Driver;

use crate::worker::Worker;
use crate::worker_manager::WorkerRegistry;

/// Shard operations, handled one at a time.
#[derive(Debug)]
pub enum ShardRequest {
    /// Bind the shard to a worker and have it served
    AssignWorker(String),
    /// Store features
    AddFeatures(Vec<FeatureDbItem>),
    /// Delete features by id
    RemoveFeatures(Vec<String>),
    /// Top-k within this shard
    SearchFeature {
        /// Query vector
        query: Feature,
        /// Result count
        k: usize,
    },
    /// Stop accepting writes
    Close,
}

/// Replies, one variant per request.
#[derive(Debug)]
pub enum ShardReply {
    /// Worker assigned
    Assigned,
    /// Ids of the stored features
    Added(Vec<String>),
    /// Number of removed features
    Removed(usize),
    /// Search hits, best first
    Hits(Vec<FeatureSearchItem>),
    /// Shard closed (or already was)
    Closed,
}

/// State owned by the actor thread.
pub struct ShardState {
    info: Arc<RwLock<DbShard>>,
    workers: Arc<WorkerRegistry>,
    driver: Arc<dyn Driver>,
}

impl ShardState {
    fn snapshot(&self) -> DbShard {
        self.info.read().clone()
    }

    fn assigned_worker(&self, info: &DbShard) -> Result<Arc<dyn Worker>> {
        if !info.has_worker() {
            return Err(Error::NoWorkerAssigned {
                shard_id: info.shard_id.clone(),
            });
        }
        self.workers
            .get(&info.worker_id)
            .ok_or_else(|| Error::WorkerNotFound {
                worker_id: info.worker_id.clone(),
            })
    }

    fn assign_worker(&mut self, worker_id: String) -> Result<ShardReply> {
        let mut info = self.snapshot();
        if info.has_worker() {
            return Err(Error::WorkerAlreadyAssigned {
                shard_id: info.shard_id,
                worker_id: info.worker_id,
            });
        }
        let worker = self
            .workers
            .get(&worker_id)
            .ok_or_else(|| Error::WorkerNotFound {
                worker_id: worker_id.clone(),
            })?;

        worker.serve_shard(&info)?;
        info.worker_id = worker_id;
        self.driver.update_shard(&info)?;
        info!(
            target: "vecshard::shard",
            shard_id = %info.shard_id,
            worker_id = %info.worker_id,
            "worker assigned"
        );
        *self.info.write() = info;
        Ok(ShardReply::Assigned)
    }

    fn add_features(&mut self, items: Vec<FeatureDbItem>) -> Result<ShardReply> {
        let mut info = self.snapshot();
        let worker = self.assigned_worker(&info)?;
        if info.is_closed {
            return Err(Error::ShardClosed {
                shard_id: info.shard_id,
            });
        }
        let requested = items.len() as u64;
        if info.used + requested > info.capacity {
            return Err(Error::Capacity {
                target: info.shard_id,
                capacity: info.capacity,
                used: info.used,
                requested,
            });
        }

        let ids = worker.add_features(&info.db_id, &info.shard_id, &items)?;
        info.used += ids.len() as u64;
        if let Err(e) = self.driver.update_shard(&info) {
            // The caller never sees these ids, so they must not stay stored.
            if let Err(undo) = worker.remove_features(&info.db_id, Some(&info.shard_id), &ids) {
                warn!(
                    target: "vecshard::shard",
                    shard_id = %info.shard_id,
                    error = %undo,
                    "failed to drop features after persistence error"
                );
            }
            return Err(e);
        }
        *self.info.write() = info.clone();
        debug!(
            target: "vecshard::shard",
            shard_id = %info.shard_id,
            added = ids.len(),
            used = info.used,
            "features added"
        );
        Ok(ShardReply::Added(ids))
    }

    fn remove_features(&mut self, ids: Vec<String>) -> Result<ShardReply> {
        let mut info = self.snapshot();
        let worker = self.assigned_worker(&info)?;
        let removed = worker.remove_features(&info.db_id, Some(&info.shard_id), &ids)?;
        if removed > 0 {
            // Removal cannot be undone on the worker: the live counter follows
            // the worker, and the next successful update rewrites `used`.
            info.used = info.used.saturating_sub(removed as u64);
            *self.info.write() = info.clone();
            self.driver.update_shard(&info)?;
        }
        Ok(ShardReply::Removed(removed))
    }

    fn search_feature(&self, query: &Feature, k: usize) -> Result<ShardReply> {
        let info = self.snapshot();
        let worker = self.assigned_worker(&info)?;
        let hits = worker.search_shard(&info.db_id, &info.shard_id, query, k)?;
        Ok(ShardReply::Hits(hits))
    }

    fn close(&mut self) -> Result<ShardReply> {
        let mut info = self.snapshot();
        if info.is_closed {
            warn!(target: "vecshard::shard", shard_id = %info.shard_id, "shard already closed, double close");
            return Ok(ShardReply::Closed);
        }

        self.driver.close_shard(&info.db_id, &info.shard_id)?;
        info.is_closed = true;
        *self.info.write() = info.clone();

        if info.has_worker() {
            match self.assigned_worker(&info) {
                Ok(worker) => {
                    if let Err(e) = worker.close_shard(&info.db_id, &info.shard_id) {
                        warn!(target: "vecshard::shard", shard_id = %info.shard_id, error = %e, "worker failed to close shard");
                    }
                }
                Err(e) => {
                    warn!(target: "vecshard::shard", shard_id = %info.shard_id, error = %e, "closing shard of unknown worker");
                }
            }
        }
        info!(target: "vecshard::shard", shard_id = %info.shard_id, used = info.used, "shard closed");
        Ok(ShardReply::Closed)
    }
}

impl Handler for ShardState {
    type Request = ShardRequest;
    type Response = Result<ShardReply>;

    fn handle(&mut self, request: ShardRequest) -> Result<ShardReply> {
        match request {
            ShardRequest::AssignWorker(worker_id) => self.assign_worker(worker_id),
            ShardRequest::AddFeatures(items) => self.add_features(items),
            ShardRequest::RemoveFeatures(ids) => self.remove_features(ids),
            ShardRequest::SearchFeature { query, k } => self.search_feature(&query, k),
            ShardRequest::Close => self.close(),
        }
    }
}

/// One shard of a database, as managed by the coordinator.
pub struct Shard {
    info: Arc<RwLock<DbShard>>,
    /// Worker id found in the persisted record at load time
    persisted_worker_id: Option<String>,
    /// Held shared by requests, exclusively while the loop starts or stops
    gate: RwLock<()>,
    actor: Actor<ShardState>,
}

impl Shard {
    /// Create a stopped shard. A non-empty `worker_id` in `info` is kept as
    /// the persisted assignment and must be re-established through
    /// [`assign_worker`](Self::assign_worker).
    pub fn new(
        mut info: DbShard,
        workers: Arc<WorkerRegistry>,
        driver: Arc<dyn Driver>,
        mailbox_capacity: usize,
    ) -> Self {
        let persisted_worker_id = if info.has_worker() {
            Some(std::mem::take(&mut info.worker_id))
        } else {
            None
        };
        let name = format!("vecshard-shard-{}", short_id(&info.shard_id));
        let info = Arc::new(RwLock::new(info));
        let state = ShardState {
            info: Arc::clone(&info),
            workers,
            driver,
        };
        Shard {
            info,
            persisted_worker_id,
            gate: RwLock::new(()),
            actor: Actor::new(name, mailbox_capacity, state),
        }
    }

    /// Snapshot of the shard record.
    pub fn info(&self) -> DbShard {
        self.info.read().clone()
    }

    /// Shard id.
    pub fn shard_id(&self) -> String {
        self.info.read().shard_id.clone()
    }

    /// Owning database.
    pub fn db_id(&self) -> String {
        self.info.read().db_id.clone()
    }

    /// True once a worker is assigned.
    pub fn has_worker(&self) -> bool {
        self.info.read().has_worker()
    }

    /// True once closed.
    pub fn is_closed(&self) -> bool {
        self.info.read().is_closed
    }

    /// Worker the shard was assigned to before the last restart.
    pub fn persisted_worker_id(&self) -> Option<&str> {
        self.persisted_worker_id.as_deref()
    }

    /// Start the actor thread. Idempotent.
    pub fn start(&self) -> Result<()> {
        let _gate = self.gate.write();
        Ok(self.actor.start()?)
    }

    /// Stop the actor thread once queued requests finish. Idempotent.
    pub fn stop(&self) {
        let _gate = self.gate.write();
        if self.actor.is_running() {
            self.actor.stop();
        }
    }

    /// True while the actor thread runs.
    pub fn is_running(&self) -> bool {
        self.actor.is_running()
    }

    fn request(&self, request: ShardRequest) -> Result<ShardReply> {
        let _gate = self.gate.read();
        self.dispatch(request)
    }

    fn dispatch(&self, request: ShardRequest) -> Result<ShardReply> {
        if self.actor.is_running() {
            return self.actor.call(request)?;
        }
        let name = self.actor.name().to_string();
        self.actor.with_idle(move |state| {
            if state.info.read().is_closed {
                state.handle(request)
            } else {
                Err(ActorError::Stopped { name }.into())
            }
        })?
    }

    /// Bind to a worker: it serves the shard and the assignment is persisted.
    pub fn assign_worker(&self, worker_id: &str) -> Result<()> {
        match self.request(ShardRequest::AssignWorker(worker_id.to_string()))? {
            ShardReply::Assigned => Ok(()),
            other => Err(unexpected("AssignWorker", &other)),
        }
    }

    /// Store features; `used` grows by the number of ids returned.
    pub fn add_features(&self, items: Vec<FeatureDbItem>) -> Result<Vec<String>> {
        match self.request(ShardRequest::AddFeatures(items))? {
            ShardReply::Added(ids) => Ok(ids),
            other => Err(unexpected("AddFeatures", &other)),
        }
    }

    /// Delete features; `used` shrinks by the number removed.
    pub fn remove_features(&self, ids: Vec<String>) -> Result<usize> {
        match self.request(ShardRequest::RemoveFeatures(ids))? {
            ShardReply::Removed(n) => Ok(n),
            other => Err(unexpected("RemoveFeatures", &other)),
        }
    }

    /// Top-k within this shard.
    pub fn search_feature(&self, query: &Feature, k: usize) -> Result<Vec<FeatureSearchItem>> {
        let request = ShardRequest::SearchFeature {
            query: query.clone(),
            k,
        };
        match self.request(request)? {
            ShardReply::Hits(hits) => Ok(hits),
            other => Err(unexpected("SearchFeature", &other)),
        }
    }

    /// Close the shard and stop its actor loop. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let _gate = self.gate.write();
        match self.dispatch(ShardRequest::Close)? {
            ShardReply::Closed => {}
            other => return Err(unexpected("Close", &other)),
        }
        if self.actor.is_running() {
            self.actor.stop();
        }
        Ok(())
    }
}

fn unexpected(request: &str, reply: &ShardReply) -> Error {
    Error::Internal(format!("unexpected reply to {}: {:?}", request, reply))
}

fn short_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}
