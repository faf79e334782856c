//! Carrying worker requests
//!
//! [`WorkerTransport`] is the seam between the manager and a worker process.
//! [`InProcessTransport`] reaches a worker living in the same process but
//! still encodes every request and response with MessagePack, so anything
//! that would not survive a real network hop fails here too. It can be told
//! to refuse connections or to answer slowly, which is how liveness is
//! exercised without a network stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;
use vecshard_core::{Error, Result};
use vecshard_worker::SearchWorker;

use crate::messages::{WireError, WireFeatureItem, WireSearchItem, WorkerRequest, WorkerResponse};

/// Sends one request to a worker and waits for its response.
pub trait WorkerTransport: Send + Sync {
    /// Address this transport talks to.
    fn address(&self) -> &str;

    /// Round-trip a request. With a `timeout`, a response slower than it
    /// fails with `WorkerUnreachable`.
    fn call(&self, request: WorkerRequest, timeout: Option<Duration>) -> Result<WorkerResponse>;
}

/// Execute a request against a worker (the worker's side of the transport).
pub fn dispatch(worker: &dyn SearchWorker, request: WorkerRequest) -> WorkerResponse {
    match execute(worker, request) {
        Ok(response) => response,
        Err(e) => WorkerResponse::Failed(WireError::from(&e)),
    }
}

fn execute(worker: &dyn SearchWorker, request: WorkerRequest) -> Result<WorkerResponse> {
    match request {
        WorkerRequest::ServeShards { shards } => {
            worker.serve_shards(&shards)?;
            Ok(WorkerResponse::Done)
        }
        WorkerRequest::CloseShards { shards } => {
            worker.close_shards(&shards)?;
            Ok(WorkerResponse::Done)
        }
        WorkerRequest::ListShards => Ok(WorkerResponse::Shards(worker.list_shards()?)),
        WorkerRequest::BatchAddFeatures {
            db_id,
            shard_id,
            items,
        } => {
            let items = items
                .iter()
                .map(WireFeatureItem::decode)
                .collect::<Result<Vec<_>>>()?;
            Ok(WorkerResponse::FeatureIds(
                worker.add_features(&db_id, &shard_id, &items)?,
            ))
        }
        WorkerRequest::RemoveFeatures {
            db_id,
            shard_id,
            ids,
        } => {
            let removed = worker.remove_features(&db_id, shard_id.as_deref(), &ids)?;
            Ok(WorkerResponse::Removed(removed as u64))
        }
        WorkerRequest::SearchFeature {
            db_id,
            shard_id,
            query,
            k,
        } => {
            let query = query.decode()?;
            let hits = worker.search_feature(&db_id, shard_id.as_deref(), &query, k as usize)?;
            Ok(WorkerResponse::Hits(
                hits.iter().map(WireSearchItem::encode).collect(),
            ))
        }
        WorkerRequest::GetSystemInfo => Ok(WorkerResponse::SystemInfo(worker.system_info()?)),
    }
}

/// Encode then decode, as a network hop would.
fn over_the_wire<T: Serialize + DeserializeOwned>(value: &T) -> Result<T> {
    let bytes = rmp_serde::to_vec(value).map_err(|e| Error::Protocol(e.to_string()))?;
    rmp_serde::from_slice(&bytes).map_err(|e| Error::Protocol(e.to_string()))
}

/// Transport to a worker in the same process.
pub struct InProcessTransport {
    address: String,
    worker: Arc<dyn SearchWorker>,
    reachable: AtomicBool,
    delay: Mutex<Duration>,
}

impl InProcessTransport {
    /// Create a reachable, zero-latency transport.
    pub fn new(address: impl Into<String>, worker: Arc<dyn SearchWorker>) -> Self {
        InProcessTransport {
            address: address.into(),
            worker,
            reachable: AtomicBool::new(true),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Refuse (false) or accept (true) requests.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// True unless connections are being refused.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Simulated response latency.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// The worker behind this transport.
    pub fn worker(&self) -> &Arc<dyn SearchWorker> {
        &self.worker
    }
}

impl WorkerTransport for InProcessTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn call(&self, request: WorkerRequest, timeout: Option<Duration>) -> Result<WorkerResponse> {
        if !self.is_reachable() {
            return Err(Error::unreachable(&self.address, "connection refused"));
        }

        let delay = *self.delay.lock();
        if let Some(timeout) = timeout {
            if delay > timeout {
                std::thread::sleep(timeout);
                return Err(Error::unreachable(
                    &self.address,
                    format!("{} timed out after {:?}", request.kind(), timeout),
                ));
            }
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        trace!(target: "vecshard::transport", address = %self.address, request = request.kind(), "dispatch");
        let request = over_the_wire(&request)?;
        let response = dispatch(self.worker.as_ref(), request);
        over_the_wire(&response)
    }
}
