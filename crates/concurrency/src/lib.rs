//! Concurrency primitives for vecshard
//!
//! This crate provides the two threading building blocks the manager and the
//! workers are assembled from:
//! - Actor: a handler with its own thread and bounded FIFO mailbox
//! - PeriodicTask: a stoppable loop used for liveness checks and probing
//!
//! Both run on named OS threads. Neither needs an async runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod actor;
pub mod periodic;

pub use actor::{Actor, Handler};
pub use periodic::PeriodicTask;

use thiserror::Error;

/// Errors raised by the actor runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActorError {
    /// The actor is not running, or stopped before answering
    #[error("actor {name} is stopped")]
    Stopped {
        /// Actor name
        name: String,
    },

    /// Idle access requested while the thread is running
    #[error("actor {name} is running")]
    Running {
        /// Actor name
        name: String,
    },

    /// The handler was lost to a failed spawn or a panicked loop
    #[error("actor {name} lost its handler")]
    Lost {
        /// Actor name
        name: String,
    },

    /// The OS refused to spawn the thread
    #[error("failed to spawn thread {name}: {reason}")]
    Spawn {
        /// Thread name
        name: String,
        /// OS error text
        reason: String,
    },
}

impl From<ActorError> for vecshard_core::Error {
    fn from(e: ActorError) -> Self {
        match e {
            ActorError::Stopped { name } => vecshard_core::Error::ShardStopped { name },
            other => vecshard_core::Error::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_maps_to_shard_stopped() {
        let err: vecshard_core::Error = ActorError::Stopped {
            name: "shard-1".into(),
        }
        .into();
        assert!(matches!(err, vecshard_core::Error::ShardStopped { ref name } if name == "shard-1"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_spawn_maps_to_internal() {
        let err: vecshard_core::Error = ActorError::Spawn {
            name: "t".into(),
            reason: "no threads".into(),
        }
        .into();
        assert!(matches!(err, vecshard_core::Error::Internal(_)));
        assert!(err.to_string().contains("no threads"));
    }
}
