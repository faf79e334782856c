//! In-memory `Worker` and `Driver` doubles for unit tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use vecshard_core::{
    DbItem, DbShard, Error, Feature, FeatureDbItem, FeatureSearchItem, FeatureTopkRanking,
    PageData, Result, WorkerItem,
};
use vecshard_storage::{Driver, MemoryDriver};
use vecshard_worker::WorkerInfo;

use crate::worker::Worker;

pub(crate) struct FakeWorker {
    id: String,
    free: u64,
    live: AtomicBool,
    next_id: AtomicU64,
    shards: Mutex<BTreeMap<String, DbShard>>,
    /// (shard_id, feature_id) → feature
    features: Mutex<BTreeMap<(String, String), Feature>>,
}

impl FakeWorker {
    pub fn new(id: &str, free: u64) -> Self {
        FakeWorker {
            id: id.to_string(),
            free,
            live: AtomicBool::new(true),
            next_id: AtomicU64::new(0),
            shards: Mutex::new(BTreeMap::new()),
            features: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn stored(&self) -> usize {
        self.features.lock().len()
    }
}

impl Worker for FakeWorker {
    fn worker_id(&self) -> &str {
        &self.id
    }

    fn address(&self) -> &str {
        "fake://"
    }

    fn capacity(&self) -> u64 {
        self.free
    }

    fn free_space(&self) -> u64 {
        self.free
    }

    fn list_shards(&self) -> Vec<DbShard> {
        self.shards.lock().values().cloned().collect()
    }

    fn serve_shard(&self, shard: &DbShard) -> Result<()> {
        self.shards
            .lock()
            .insert(shard.shard_id.clone(), shard.clone());
        Ok(())
    }

    fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()> {
        match self.shards.lock().get_mut(shard_id) {
            Some(shard) => {
                shard.is_closed = true;
                Ok(())
            }
            None => Err(Error::ShardNotFound {
                db_id: db_id.to_string(),
                shard_id: shard_id.to_string(),
            }),
        }
    }

    fn add_features(
        &self,
        _db_id: &str,
        shard_id: &str,
        items: &[FeatureDbItem],
    ) -> Result<Vec<String>> {
        let mut features = self.features.lock();
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = format!("{}-{}", self.id, self.next_id.fetch_add(1, Ordering::SeqCst));
            features.insert((shard_id.to_string(), id.clone()), item.feature.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    fn remove_features(
        &self,
        _db_id: &str,
        shard_id: Option<&str>,
        ids: &[String],
    ) -> Result<usize> {
        let mut features = self.features.lock();
        let before = features.len();
        features.retain(|(shard, id), _| {
            !(ids.contains(id) && shard_id.map_or(true, |s| s == shard))
        });
        Ok(before - features.len())
    }

    fn search_feature(
        &self,
        _db_id: &str,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>> {
        let features = self.features.lock();
        let mut rank = FeatureTopkRanking::new(query, k);
        for ((_, id), feature) in features.iter() {
            rank.feed_in(id, feature);
        }
        Ok(rank.sort_out())
    }

    fn search_shard(
        &self,
        _db_id: &str,
        shard_id: &str,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>> {
        let features = self.features.lock();
        let mut rank = FeatureTopkRanking::new(query, k);
        for ((shard, id), feature) in features.iter() {
            if shard == shard_id {
                rank.feed_in(id, feature);
            }
        }
        Ok(rank.sort_out())
    }

    fn health_check(&self, _timeout: Duration) -> Result<WorkerInfo> {
        Ok(WorkerInfo {
            worker_id: self.id.clone(),
            capacity: self.free,
            shards: self.shards.lock().len() as u64,
            features: self.features.lock().len() as u64,
        })
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }
}

/// `MemoryDriver` whose shard record writes can be made to fail.
#[derive(Default)]
pub(crate) struct FailingDriver {
    inner: MemoryDriver,
    fail_shard_writes: AtomicBool,
}

impl FailingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_shard_writes(&self, fail: bool) {
        self.fail_shard_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail_shard_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence("shard record write refused"));
        }
        Ok(())
    }
}

impl Driver for FailingDriver {
    fn init(&self, known_db_ids: &[String]) -> Result<()> {
        self.inner.init(known_db_ids)
    }

    fn create_db(&self, db: &DbItem) -> Result<String> {
        self.inner.create_db(db)
    }

    fn find_db(&self, db_id: &str) -> Result<DbItem> {
        self.inner.find_db(db_id)
    }

    fn list_dbs(&self) -> Result<Vec<DbItem>> {
        self.inner.list_dbs()
    }

    fn delete_db(&self, db_id: &str) -> Result<()> {
        self.inner.delete_db(db_id)
    }

    fn list_workers(&self) -> Result<Vec<WorkerItem>> {
        self.inner.list_workers()
    }

    fn create_worker(&self, worker: &WorkerItem) -> Result<()> {
        self.inner.create_worker(worker)
    }

    fn update_worker(&self, worker: &WorkerItem) -> Result<()> {
        self.inner.update_worker(worker)
    }

    fn list_shards(&self, db_id: &str) -> Result<Vec<DbShard>> {
        self.inner.list_shards(db_id)
    }

    fn create_shard(&self, db_id: &str, shard: &DbShard) -> Result<String> {
        self.inner.create_shard(db_id, shard)
    }

    fn update_shard(&self, shard: &DbShard) -> Result<()> {
        self.check()?;
        self.inner.update_shard(shard)
    }

    fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()> {
        self.check()?;
        self.inner.close_shard(db_id, shard_id)
    }

    fn list_features(
        &self,
        page: u64,
        per_page: u64,
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<PageData<Vec<FeatureDbItem>>> {
        self.inner.list_features(page, per_page, db_id, shard_id)
    }

    fn add_features(
        &self,
        items: &[FeatureDbItem],
        db_id: &str,
        shard_id: &str,
    ) -> Result<Vec<String>> {
        self.inner.add_features(items, db_id, shard_id)
    }

    fn load_features(&self, ids: &[String], db_id: &str, shard_id: &str) -> Result<Vec<Feature>> {
        self.inner.load_features(ids, db_id, shard_id)
    }

    fn remove_features(
        &self,
        ids: &[String],
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<usize> {
        self.inner.remove_features(ids, db_id, shard_id)
    }
}
