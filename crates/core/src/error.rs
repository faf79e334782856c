//! Error types for vecshard
//!
//! Every crate in the workspace reports failures through [`Error`]. The
//! variants are split so callers can tell a transient condition (a worker
//! that did not answer, no placement target right now) from one that will
//! never succeed (unknown database, malformed feature blob).
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for vecshard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the feature store
#[derive(Debug, Error)]
pub enum Error {
    /// Database id is unknown (or soft-deleted)
    #[error("Database not found: {db_id}")]
    DbNotFound {
        /// Requested database id
        db_id: String,
    },

    /// Shard id is unknown within the database
    #[error("Shard not found: {db_id}/{shard_id}")]
    ShardNotFound {
        /// Database id
        db_id: String,
        /// Requested shard id
        shard_id: String,
    },

    /// Worker id is not in the registry
    #[error("Worker not found: {worker_id}")]
    WorkerNotFound {
        /// Requested worker id
        worker_id: String,
    },

    /// Shard (or worker) has no room for the requested write
    #[error("Capacity exceeded on {target}: capacity {capacity}, used {used}, requested {requested}")]
    Capacity {
        /// Shard id or worker id that ran out of room
        target: String,
        /// Total capacity
        capacity: u64,
        /// Currently used
        used: u64,
        /// Requested amount
        requested: u64,
    },

    /// Shard no longer accepts writes
    #[error("Shard is closed: {shard_id}")]
    ShardClosed {
        /// Closed shard id
        shard_id: String,
    },

    /// Shard has not been bound to a worker yet
    #[error("Shard {shard_id} has no worker assigned")]
    NoWorkerAssigned {
        /// Shard id
        shard_id: String,
    },

    /// Shard is already bound to a worker
    #[error("Shard {shard_id} already served by worker {worker_id}")]
    WorkerAlreadyAssigned {
        /// Shard id
        shard_id: String,
        /// Worker currently assigned
        worker_id: String,
    },

    /// Placement found no live worker with free space
    #[error("No worker available for placement")]
    NoWorkerAvailable,

    /// Call to a worker failed or timed out
    #[error("Worker {worker} unreachable: {reason}")]
    WorkerUnreachable {
        /// Worker id or address
        worker: String,
        /// Transport-level reason
        reason: String,
    },

    /// Driver call failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Malformed message crossing the worker boundary
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Caller supplied an unusable argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is missing keys or names an unsupported backend
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shard's actor loop is not running
    #[error("Shard actor stopped: {name}")]
    ShardStopped {
        /// Actor name
        name: String,
    },

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal invariant broken
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a `Persistence` error from anything displayable.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Error::Persistence(msg.into())
    }

    /// Build an `InvalidInput` error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Build a `WorkerUnreachable` error.
    pub fn unreachable(worker: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::WorkerUnreachable {
            worker: worker.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a missing database, shard or worker
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::DbNotFound { .. } | Error::ShardNotFound { .. } | Error::WorkerNotFound { .. }
        )
    }

    /// Check if retrying the same request later may succeed
    ///
    /// Unreachable workers come back, placement may find a worker once one
    /// registers, and a stopped shard is replaced on restart. Everything else
    /// fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::WorkerUnreachable { .. }
                | Error::NoWorkerAvailable
                | Error::ShardStopped { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
