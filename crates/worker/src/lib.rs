//! Search workers for vecshard
//!
//! A worker holds the features of the shards it has been told to serve and
//! answers searches over them:
//! - MemoryShard: per-shard feature cache driven by an actor
//! - ShardRegistry: the shards one worker serves
//! - SearchWorker: the contract the manager talks to
//! - BruteForceWorker: exhaustive scan implementation
//! - WorkerConfig: JSON configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod brute_force;
pub mod config;
pub mod memory_shard;
pub mod registry;
pub mod search_worker;

pub use brute_force::BruteForceWorker;
pub use config::WorkerConfig;
pub use memory_shard::MemoryShard;
pub use registry::ShardRegistry;
pub use search_worker::{SearchWorker, WorkerInfo};
