//! vecshard - sharded feature-vector store
//!
//! Features (embedding vectors) are grouped into databases. Each database
//! is split into capacity-bounded shards; every shard is served by one
//! search worker, and the manager's [`Coordinator`] routes writes to the
//! writable shard and merges top-k searches across all of them.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vecshard::{
//!     BruteForceWorker, Coordinator, DbItem, Feature, LocalConnector, ManagerConfig,
//!     MemoryDriver, WorkerConfig,
//! };
//!
//! let driver = Arc::new(MemoryDriver::new());
//! let connector = Arc::new(LocalConnector::new());
//! let worker = BruteForceWorker::new(WorkerConfig::default(), driver.clone());
//! connector.register("local://w1", Arc::new(worker));
//!
//! let config = ManagerConfig::new(vec!["local://w1".into()]);
//! let coordinator = Coordinator::new(&config, driver, connector);
//! coordinator.start()?;
//!
//! let db_id = coordinator.create_db(&DbItem::new("faces", 1_000_000))?;
//! let ids = coordinator.add_features(&db_id, vec![Feature::new(vec![0.1, 0.9], "arcface", 1)])?;
//! let hits = coordinator.search_feature(&db_id, &Feature::new(vec![0.1, 0.9], "arcface", 1), 5)?;
//! ```

pub use vecshard_concurrency::{Actor, ActorError, Handler, PeriodicTask};
pub use vecshard_core::*;
pub use vecshard_manager::{
    Coordinator, InProcessTransport, LocalConnector, ManagerConfig, RemoteWorker, Shard,
    ShardManager, ShardSettings, Worker, WorkerConnector, WorkerManager, WorkerManagerSettings,
    WorkerRegistry, WorkerTransport,
};
pub use vecshard_storage::{open_driver, Driver, DriverConfig, LocalDriver, MemoryDriver};
pub use vecshard_worker::{
    BruteForceWorker, MemoryShard, SearchWorker, ShardRegistry, WorkerConfig, WorkerInfo,
};
