//! Messages exchanged with a search worker
//!
//! Features cross the boundary as a little-endian `f32` blob plus model name
//! and version; metadata as flat string pairs. Every request gets exactly
//! one response. Worker-side failures travel back as a [`WireError`] and are
//! turned into a local [`Error`] by the caller.

use serde::{Deserialize, Serialize};
use vecshard_core::{DbShard, Error, Feature, FeatureDbItem, FeatureSearchItem, Metadata, Result};
use vecshard_worker::WorkerInfo;

/// A feature as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFeature {
    /// `dimension * 4` bytes, little-endian f32
    pub blob: Vec<u8>,
    /// Model name
    pub model: String,
    /// Model version
    pub version: i32,
}

impl WireFeature {
    /// Encode a feature.
    pub fn encode(feature: &Feature) -> Self {
        WireFeature {
            blob: feature.to_blob(),
            model: feature.model.clone(),
            version: feature.version,
        }
    }

    /// Decode into a feature. Fails with `Protocol` on a malformed blob.
    pub fn decode(&self) -> Result<Feature> {
        Feature::from_blob(&self.blob, self.model.clone(), self.version)
    }
}

/// A stored feature on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFeatureItem {
    /// Empty on insert
    pub feature_id: String,
    /// The vector
    pub feature: WireFeature,
    /// Caller metadata
    pub metadata: Metadata,
}

impl WireFeatureItem {
    /// Encode an item.
    pub fn encode(item: &FeatureDbItem) -> Self {
        WireFeatureItem {
            feature_id: item.feature_id.clone(),
            feature: WireFeature::encode(&item.feature),
            metadata: item.metadata.clone(),
        }
    }

    /// Decode an item.
    pub fn decode(&self) -> Result<FeatureDbItem> {
        Ok(FeatureDbItem {
            feature_id: self.feature_id.clone(),
            feature: self.feature.decode()?,
            metadata: self.metadata.clone(),
        })
    }
}

/// A search hit on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSearchItem {
    /// Stored feature id
    pub feature_id: String,
    /// Stored feature
    pub feature: WireFeature,
    /// Similarity
    pub score: f32,
}

impl WireSearchItem {
    /// Encode a hit.
    pub fn encode(item: &FeatureSearchItem) -> Self {
        WireSearchItem {
            feature_id: item.feature_id.clone(),
            feature: WireFeature::encode(&item.feature),
            score: item.score,
        }
    }

    /// Decode a hit.
    pub fn decode(&self) -> Result<FeatureSearchItem> {
        Ok(FeatureSearchItem::new(
            self.feature_id.clone(),
            self.feature.decode()?,
            self.score,
        ))
    }
}

/// Requests a manager sends to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerRequest {
    /// Start serving shards
    ServeShards {
        /// Shard records
        shards: Vec<DbShard>,
    },
    /// Stop accepting writes on shards
    CloseShards {
        /// Shard records
        shards: Vec<DbShard>,
    },
    /// Shards currently served
    ListShards,
    /// Store features in one shard
    BatchAddFeatures {
        /// Database id
        db_id: String,
        /// Target shard
        shard_id: String,
        /// Features to store
        items: Vec<WireFeatureItem>,
    },
    /// Delete features
    RemoveFeatures {
        /// Database id
        db_id: String,
        /// Restrict to one shard
        shard_id: Option<String>,
        /// Feature ids
        ids: Vec<String>,
    },
    /// Top-k search
    SearchFeature {
        /// Database id
        db_id: String,
        /// Restrict to one shard
        shard_id: Option<String>,
        /// Query vector
        query: WireFeature,
        /// Result count
        k: u64,
    },
    /// Health check
    GetSystemInfo,
}

impl WorkerRequest {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::ServeShards { .. } => "ServeShards",
            WorkerRequest::CloseShards { .. } => "CloseShards",
            WorkerRequest::ListShards => "ListShards",
            WorkerRequest::BatchAddFeatures { .. } => "BatchAddFeatures",
            WorkerRequest::RemoveFeatures { .. } => "RemoveFeatures",
            WorkerRequest::SearchFeature { .. } => "SearchFeature",
            WorkerRequest::GetSystemInfo => "GetSystemInfo",
        }
    }
}

/// Worker-side failure, as transmitted. Every error variant keeps its tag
/// so not-found and retryable failures stay recognizable on the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireError {
    /// Database unknown to the worker's driver
    DbNotFound {
        /// Database id
        db_id: String,
    },
    /// Shard is not served by the worker
    ShardNotFound {
        /// Database id
        db_id: String,
        /// Shard id
        shard_id: String,
    },
    /// Worker id unknown
    WorkerNotFound {
        /// Worker id
        worker_id: String,
    },
    /// No room for the request
    Capacity {
        /// Shard id or worker id
        target: String,
        /// Total capacity
        capacity: u64,
        /// Currently used
        used: u64,
        /// Requested amount
        requested: u64,
    },
    /// Shard no longer accepts writes
    ShardClosed {
        /// Shard id
        shard_id: String,
    },
    /// Shard has no worker
    NoWorkerAssigned {
        /// Shard id
        shard_id: String,
    },
    /// Shard already bound to a worker
    WorkerAlreadyAssigned {
        /// Shard id
        shard_id: String,
        /// Worker id
        worker_id: String,
    },
    /// No placement target
    NoWorkerAvailable,
    /// A worker the remote depends on did not answer
    WorkerUnreachable {
        /// Worker id or address
        worker: String,
        /// Transport-level reason
        reason: String,
    },
    /// Shard actor on the worker is not running
    ShardStopped {
        /// Actor name
        name: String,
    },
    /// Worker's driver failed
    Persistence(String),
    /// Malformed data crossed the boundary
    Protocol(String),
    /// Request was malformed
    InvalidInput(String),
    /// Worker configuration problem
    Config(String),
    /// Encoding or decoding failed on the worker
    Serialization(String),
    /// Anything else
    Remote(String),
}

impl From<&Error> for WireError {
    fn from(e: &Error) -> Self {
        match e {
            Error::DbNotFound { db_id } => WireError::DbNotFound {
                db_id: db_id.clone(),
            },
            Error::ShardNotFound { db_id, shard_id } => WireError::ShardNotFound {
                db_id: db_id.clone(),
                shard_id: shard_id.clone(),
            },
            Error::WorkerNotFound { worker_id } => WireError::WorkerNotFound {
                worker_id: worker_id.clone(),
            },
            Error::Capacity {
                target,
                capacity,
                used,
                requested,
            } => WireError::Capacity {
                target: target.clone(),
                capacity: *capacity,
                used: *used,
                requested: *requested,
            },
            Error::ShardClosed { shard_id } => WireError::ShardClosed {
                shard_id: shard_id.clone(),
            },
            Error::NoWorkerAssigned { shard_id } => WireError::NoWorkerAssigned {
                shard_id: shard_id.clone(),
            },
            Error::WorkerAlreadyAssigned {
                shard_id,
                worker_id,
            } => WireError::WorkerAlreadyAssigned {
                shard_id: shard_id.clone(),
                worker_id: worker_id.clone(),
            },
            Error::NoWorkerAvailable => WireError::NoWorkerAvailable,
            Error::WorkerUnreachable { worker, reason } => WireError::WorkerUnreachable {
                worker: worker.clone(),
                reason: reason.clone(),
            },
            Error::ShardStopped { name } => WireError::ShardStopped { name: name.clone() },
            Error::Persistence(msg) => WireError::Persistence(msg.clone()),
            Error::Protocol(msg) => WireError::Protocol(msg.clone()),
            Error::InvalidInput(msg) => WireError::InvalidInput(msg.clone()),
            Error::Config(msg) => WireError::Config(msg.clone()),
            Error::Serialization(msg) => WireError::Serialization(msg.clone()),
            Error::Io(_) | Error::Internal(_) => WireError::Remote(e.to_string()),
        }
    }
}

impl WireError {
    /// Local error for a failure reported by `worker`.
    pub fn into_error(self, worker: &str) -> Error {
        match self {
            WireError::DbNotFound { db_id } => Error::DbNotFound { db_id },
            WireError::ShardNotFound { db_id, shard_id } => Error::ShardNotFound { db_id, shard_id },
            WireError::WorkerNotFound { worker_id } => Error::WorkerNotFound { worker_id },
            WireError::Capacity {
                target,
                capacity,
                used,
                requested,
            } => Error::Capacity {
                target,
                capacity,
                used,
                requested,
            },
            WireError::ShardClosed { shard_id } => Error::ShardClosed { shard_id },
            WireError::NoWorkerAssigned { shard_id } => Error::NoWorkerAssigned { shard_id },
            WireError::WorkerAlreadyAssigned {
                shard_id,
                worker_id,
            } => Error::WorkerAlreadyAssigned {
                shard_id,
                worker_id,
            },
            WireError::NoWorkerAvailable => Error::NoWorkerAvailable,
            WireError::WorkerUnreachable { worker, reason } => {
                Error::WorkerUnreachable { worker, reason }
            }
            WireError::ShardStopped { name } => Error::ShardStopped { name },
            WireError::Persistence(msg) => Error::Persistence(msg),
            WireError::Protocol(msg) => Error::Protocol(msg),
            WireError::InvalidInput(msg) => Error::InvalidInput(msg),
            WireError::Config(msg) => Error::Config(msg),
            WireError::Serialization(msg) => Error::Serialization(msg),
            WireError::Remote(msg) => Error::Internal(format!("worker {}: {}", worker, msg)),
        }
    }
}

/// Responses a worker sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerResponse {
    /// Request succeeded with no payload
    Done,
    /// Served shard records
    Shards(Vec<DbShard>),
    /// Ids assigned to added features
    FeatureIds(Vec<String>),
    /// Number of removed features
    Removed(u64),
    /// Search hits, best first
    Hits(Vec<WireSearchItem>),
    /// Health summary
    SystemInfo(WorkerInfo),
    /// Request failed on the worker
    Failed(WireError),
}

impl WorkerResponse {
    /// Short name for logs and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerResponse::Done => "Done",
            WorkerResponse::Shards(_) => "Shards",
            WorkerResponse::FeatureIds(_) => "FeatureIds",
            WorkerResponse::Removed(_) => "Removed",
            WorkerResponse::Hits(_) => "Hits",
            WorkerResponse::SystemInfo(_) => "SystemInfo",
            WorkerResponse::Failed(_) => "Failed",
        }
    }
}
