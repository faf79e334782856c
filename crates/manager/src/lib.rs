//! Manager side of vecshard
//!
//! The manager owns the metadata and decides where features live:
//! - Coordinator: public entry point for databases, writes and searches
//! - ShardManager: directory of shard actors, shard creation and rollover
//! - Shard: actor serializing every operation on one shard
//! - WorkerManager: connected workers, liveness monitors, placement
//! - RemoteWorker: a worker reached through a WorkerTransport
//! - messages: the request/response protocol spoken with workers
//! - ManagerConfig: JSON configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connector;
pub mod coordinator;
pub mod messages;
pub mod remote;
pub mod shard;
pub mod shard_manager;
pub mod transport;
pub mod worker;
pub mod worker_manager;

#[cfg(test)]
mod test_support;

pub use config::ManagerConfig;
pub use connector::{LocalConnector, WorkerConnector};
pub use coordinator::Coordinator;
pub use remote::RemoteWorker;
pub use shard::Shard;
pub use shard_manager::{ShardManager, ShardSettings};
pub use transport::{dispatch, InProcessTransport, WorkerTransport};
pub use worker::Worker;
pub use worker_manager::{WorkerManager, WorkerManagerSettings, WorkerRegistry};
