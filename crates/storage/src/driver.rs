//! Persistence interface
//!
//! A [`Driver`] stores database, shard and worker metadata plus the feature
//! vectors themselves. The manager uses it for metadata; each worker uses it
//! to load and write through the features of the shards it serves. All
//! methods take `&self`: implementations synchronize internally and are
//! shared behind `Arc<dyn Driver>`.

use vecshard_core::{DbItem, DbShard, Feature, FeatureDbItem, PageData, Result, WorkerItem};

/// Persistence for metadata and features.
pub trait Driver: Send + Sync {
    /// Prepare feature storage for databases known ahead of time.
    fn init(&self, known_db_ids: &[String]) -> Result<()>;

    // ---- databases ----

    /// Create a database; the driver assigns and returns its id.
    fn create_db(&self, db: &DbItem) -> Result<String>;

    /// Look up a live database. `DbNotFound` if unknown or deleted.
    fn find_db(&self, db_id: &str) -> Result<DbItem>;

    /// Every live database.
    fn list_dbs(&self) -> Result<Vec<DbItem>>;

    /// Soft-delete: the record stays, but is hidden from lookups.
    fn delete_db(&self, db_id: &str) -> Result<()>;

    // ---- workers ----

    /// Every persisted worker record.
    fn list_workers(&self) -> Result<Vec<WorkerItem>>;

    /// Insert a worker record, replacing any record with the same id.
    fn create_worker(&self, worker: &WorkerItem) -> Result<()>;

    /// Update an existing worker record. `WorkerNotFound` otherwise.
    fn update_worker(&self, worker: &WorkerItem) -> Result<()>;

    // ---- shards ----

    /// Shards of a database, in creation order.
    fn list_shards(&self, db_id: &str) -> Result<Vec<DbShard>>;

    /// Create a shard; the driver assigns and returns its id.
    fn create_shard(&self, db_id: &str, shard: &DbShard) -> Result<String>;

    /// Overwrite a shard record (matched by `db_id` + `shard_id`).
    fn update_shard(&self, shard: &DbShard) -> Result<()>;

    /// Mark a shard closed.
    fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()>;

    // ---- features ----

    /// One page (0-based) of stored features, optionally restricted to a
    /// shard. `total_page` counts pages of the filtered listing.
    fn list_features(
        &self,
        page: u64,
        per_page: u64,
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<PageData<Vec<FeatureDbItem>>>;

    /// Store features in a shard and return their new ids, in input order.
    fn add_features(
        &self,
        items: &[FeatureDbItem],
        db_id: &str,
        shard_id: &str,
    ) -> Result<Vec<String>>;

    /// Load stored vectors by id. Ids not stored in the shard are skipped.
    fn load_features(&self, ids: &[String], db_id: &str, shard_id: &str) -> Result<Vec<Feature>>;

    /// Delete features and return how many were removed. Ids outside the
    /// db (or shard, if given) are ignored.
    fn remove_features(&self, ids: &[String], db_id: &str, shard_id: Option<&str>)
        -> Result<usize>;
}
