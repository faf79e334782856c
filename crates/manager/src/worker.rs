//! Manager-side view of a search worker

use std::time::Duration;

use vecshard_core::{DbShard, Feature, FeatureDbItem, FeatureSearchItem, Result};
use vecshard_worker::WorkerInfo;

/// A search worker as the manager sees it.
///
/// The manager tracks the shards it has asked the worker to serve and a
/// liveness flag maintained by the worker manager's monitor.
pub trait Worker: Send + Sync {
    /// Stable worker id.
    fn worker_id(&self) -> &str;

    /// Address the worker was reached at.
    fn address(&self) -> &str;

    /// Capacity the worker advertised.
    fn capacity(&self) -> u64;

    /// `capacity` minus the capacity of every shard served (closed shards
    /// still count: their features stay in memory).
    fn free_space(&self) -> u64;

    /// Shards this worker has been told to serve.
    fn list_shards(&self) -> Vec<DbShard>;

    /// Start serving a shard. `Capacity` if the shard's capacity exceeds the
    /// free space; serving an already served shard is a no-op.
    fn serve_shard(&self, shard: &DbShard) -> Result<()>;

    /// Stop accepting writes on a served shard.
    fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()>;

    /// Store features in a served shard.
    fn add_features(
        &self,
        db_id: &str,
        shard_id: &str,
        items: &[FeatureDbItem],
    ) -> Result<Vec<String>>;

    /// Delete features from one shard, or from every shard of the db this
    /// worker serves.
    fn remove_features(&self, db_id: &str, shard_id: Option<&str>, ids: &[String])
        -> Result<usize>;

    /// Top-k across every shard of the db this worker serves.
    fn search_feature(&self, db_id: &str, query: &Feature, k: usize)
        -> Result<Vec<FeatureSearchItem>>;

    /// Top-k within one shard.
    fn search_shard(
        &self,
        db_id: &str,
        shard_id: &str,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>>;

    /// Ask the worker for its system info, failing after `timeout`.
    fn health_check(&self, timeout: Duration) -> Result<WorkerInfo>;

    /// Result of the latest health check.
    fn is_live(&self) -> bool;

    /// Record a health check result.
    fn set_live(&self, live: bool);
}
