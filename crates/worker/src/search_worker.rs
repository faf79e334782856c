//! The worker contract seen by the manager

use serde::{Deserialize, Serialize};
use vecshard_core::{DbShard, Feature, FeatureDbItem, FeatureSearchItem, Result};

/// Health and load summary answered to `GetSystemInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Worker id
    pub worker_id: String,
    /// Advertised capacity in features
    pub capacity: u64,
    /// Shards currently served
    pub shards: u64,
    /// Features currently cached across all served shards
    pub features: u64,
}

/// A process that holds shards in memory and answers searches over them.
pub trait SearchWorker: Send + Sync {
    /// Stable id of this worker.
    fn worker_id(&self) -> String;

    /// Advertised capacity in features.
    fn capacity(&self) -> u64;

    /// Start (or restart) serving.
    fn start(&self) -> Result<()>;

    /// Stop every served shard. Idempotent.
    fn stop(&self) -> Result<()>;

    /// Build or refresh the search index.
    fn train_index(&self) -> Result<()>;

    /// Start serving shards: load their features and accept requests.
    fn serve_shards(&self, shards: &[DbShard]) -> Result<()>;

    /// Stop accepting writes on shards; they keep answering searches.
    fn close_shards(&self, shards: &[DbShard]) -> Result<()>;

    /// Records of every served shard, `used` = features cached.
    fn list_shards(&self) -> Result<Vec<DbShard>>;

    /// Persist and cache features in one served shard.
    fn add_features(
        &self,
        db_id: &str,
        shard_id: &str,
        items: &[FeatureDbItem],
    ) -> Result<Vec<String>>;

    /// Delete features from one shard, or from every served shard of the
    /// db when `shard_id` is `None`.
    fn remove_features(&self, db_id: &str, shard_id: Option<&str>, ids: &[String])
        -> Result<usize>;

    /// Best `k` matches in one shard, or merged across every served shard
    /// of the db when `shard_id` is `None`.
    fn search_feature(
        &self,
        db_id: &str,
        shard_id: Option<&str>,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>>;

    /// Health summary.
    fn system_info(&self) -> Result<WorkerInfo>;
}
