//! Worker reached through a transport

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};
use vecshard_core::{DbShard, Error, Feature, FeatureDbItem, FeatureSearchItem, Result};
use vecshard_worker::WorkerInfo;

use crate::messages::{WireFeature, WireFeatureItem, WireSearchItem, WorkerRequest, WorkerResponse};
use crate::transport::WorkerTransport;
use crate::worker::Worker;

/// A worker behind a [`WorkerTransport`].
pub struct RemoteWorker {
    worker_id: String,
    capacity: u64,
    transport: Arc<dyn WorkerTransport>,
    /// shard_id → record, for shards this manager asked the worker to serve
    served: RwLock<BTreeMap<String, DbShard>>,
    live: AtomicBool,
}

impl RemoteWorker {
    /// Connect: fetch the worker's id and capacity, and adopt the shards it
    /// already serves.
    pub fn connect(transport: Arc<dyn WorkerTransport>, timeout: Duration) -> Result<Self> {
        let info = match transport.call(WorkerRequest::GetSystemInfo, Some(timeout))? {
            WorkerResponse::SystemInfo(info) => info,
            other => return Err(check_failed(transport.address(), other)),
        };
        let served = match transport.call(WorkerRequest::ListShards, Some(timeout))? {
            WorkerResponse::Shards(shards) => shards
                .into_iter()
                .map(|shard| (shard.shard_id.clone(), shard))
                .collect(),
            other => return Err(check_failed(transport.address(), other)),
        };

        info!(
            target: "vecshard::worker",
            worker_id = %info.worker_id,
            address = %transport.address(),
            capacity = info.capacity,
            "connected to worker"
        );
        Ok(RemoteWorker {
            worker_id: info.worker_id,
            capacity: info.capacity,
            transport,
            served: RwLock::new(served),
            live: AtomicBool::new(true),
        })
    }

    fn call(&self, request: WorkerRequest) -> Result<WorkerResponse> {
        match self.transport.call(request, None)? {
            WorkerResponse::Failed(e) => Err(e.into_error(&self.worker_id)),
            response => Ok(response),
        }
    }

    fn search(
        &self,
        db_id: &str,
        shard_id: Option<&str>,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>> {
        let request = WorkerRequest::SearchFeature {
            db_id: db_id.to_string(),
            shard_id: shard_id.map(str::to_string),
            query: WireFeature::encode(query),
            k: k as u64,
        };
        match self.call(request)? {
            WorkerResponse::Hits(hits) => hits.iter().map(WireSearchItem::decode).collect(),
            other => Err(unexpected("SearchFeature", &other)),
        }
    }
}

fn unexpected(request: &str, response: &WorkerResponse) -> Error {
    Error::Protocol(format!(
        "unexpected {} response to {}",
        response.kind(),
        request
    ))
}

fn check_failed(address: &str, response: WorkerResponse) -> Error {
    match response {
        WorkerResponse::Failed(e) => e.into_error(address),
        other => unexpected("handshake", &other),
    }
}

impl Worker for RemoteWorker {
    fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn address(&self) -> &str {
        self.transport.address()
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn free_space(&self) -> u64 {
        let reserved: u64 = self.served.read().values().map(|s| s.capacity).sum();
        self.capacity.saturating_sub(reserved)
    }

    fn list_shards(&self) -> Vec<DbShard> {
        self.served.read().values().cloned().collect()
    }

    fn serve_shard(&self, shard: &DbShard) -> Result<()> {
        if self.served.read().contains_key(&shard.shard_id) {
            warn!(target: "vecshard::worker", worker_id = %self.worker_id, shard_id = %shard.shard_id, "shard already served by this worker");
            return Ok(());
        }

        let free = self.free_space();
        if shard.capacity > free {
            return Err(Error::Capacity {
                target: self.worker_id.clone(),
                capacity: self.capacity,
                used: self.capacity - free,
                requested: shard.capacity,
            });
        }

        match self.call(WorkerRequest::ServeShards {
            shards: vec![shard.clone()],
        })? {
            WorkerResponse::Done => {
                self.served
                    .write()
                    .insert(shard.shard_id.clone(), shard.clone());
                Ok(())
            }
            other => Err(unexpected("ServeShards", &other)),
        }
    }

    fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()> {
        let mut record = self
            .served
            .read()
            .get(shard_id)
            .cloned()
            .ok_or_else(|| Error::ShardNotFound {
                db_id: db_id.to_string(),
                shard_id: shard_id.to_string(),
            })?;
        record.is_closed = true;

        match self.call(WorkerRequest::CloseShards {
            shards: vec![record.clone()],
        })? {
            WorkerResponse::Done => {
                self.served.write().insert(shard_id.to_string(), record);
                Ok(())
            }
            other => Err(unexpected("CloseShards", &other)),
        }
    }

    fn add_features(
        &self,
        db_id: &str,
        shard_id: &str,
        items: &[FeatureDbItem],
    ) -> Result<Vec<String>> {
        match self.served.read().get(shard_id) {
            None => {
                return Err(Error::ShardNotFound {
                    db_id: db_id.to_string(),
                    shard_id: shard_id.to_string(),
                })
            }
            Some(shard) if shard.is_closed => {
                return Err(Error::ShardClosed {
                    shard_id: shard_id.to_string(),
                })
            }
            Some(_) => {}
        }

        let request = WorkerRequest::BatchAddFeatures {
            db_id: db_id.to_string(),
            shard_id: shard_id.to_string(),
            items: items.iter().map(WireFeatureItem::encode).collect(),
        };
        match self.call(request)? {
            WorkerResponse::FeatureIds(ids) => Ok(ids),
            other => Err(unexpected("BatchAddFeatures", &other)),
        }
    }

    fn remove_features(
        &self,
        db_id: &str,
        shard_id: Option<&str>,
        ids: &[String],
    ) -> Result<usize> {
        let request = WorkerRequest::RemoveFeatures {
            db_id: db_id.to_string(),
            shard_id: shard_id.map(str::to_string),
            ids: ids.to_vec(),
        };
        match self.call(request)? {
            WorkerResponse::Removed(n) => Ok(n as usize),
            other => Err(unexpected("RemoveFeatures", &other)),
        }
    }

    fn search_feature(
        &self,
        db_id: &str,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>> {
        self.search(db_id, None, query, k)
    }

    fn search_shard(
        &self,
        db_id: &str,
        shard_id: &str,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>> {
        self.search(db_id, Some(shard_id), query, k)
    }

    fn health_check(&self, timeout: Duration) -> Result<WorkerInfo> {
        match self
            .transport
            .call(WorkerRequest::GetSystemInfo, Some(timeout))?
        {
            WorkerResponse::SystemInfo(info) => Ok(info),
            other => Err(check_failed(&self.worker_id, other)),
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }
}
