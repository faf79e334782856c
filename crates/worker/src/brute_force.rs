//! Exhaustive-scan search worker
//!
//! [`BruteForceWorker`] keeps every served shard in a [`MemoryShard`] and
//! answers a search by scanning each one and merging the per-shard answers
//! with the same top-k accumulator the shards use. There is no index to
//! train.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use vecshard_core::{
    DbShard, Error, Feature, FeatureDbItem, FeatureSearchItem, FeatureTopkRanking, Result,
};
use vecshard_storage::{open_driver, Driver};

use crate::config::WorkerConfig;
use crate::memory_shard::MemoryShard;
use crate::registry::ShardRegistry;
use crate::search_worker::{SearchWorker, WorkerInfo};

/// Search worker that scans cached features linearly.
pub struct BruteForceWorker {
    worker_id: String,
    config: WorkerConfig,
    driver: Arc<dyn Driver>,
    registry: ShardRegistry,
}

impl BruteForceWorker {
    /// Create a worker over an already opened driver.
    pub fn new(config: WorkerConfig, driver: Arc<dyn Driver>) -> Self {
        let worker_id = config
            .worker_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        BruteForceWorker {
            worker_id,
            config,
            driver,
            registry: ShardRegistry::new(),
        }
    }

    /// Open the configured driver and create a worker over it.
    pub fn open(config: WorkerConfig) -> Result<Self> {
        let driver = open_driver(&config.driver)?;
        Ok(Self::new(config, driver))
    }

    fn shard(&self, db_id: &str, shard_id: &str) -> Result<Arc<MemoryShard>> {
        self.registry
            .get(db_id, shard_id)
            .ok_or_else(|| Error::ShardNotFound {
                db_id: db_id.to_string(),
                shard_id: shard_id.to_string(),
            })
    }

    /// The shard named by `shard_id`, or every shard of the db.
    fn scoped(&self, db_id: &str, shard_id: Option<&str>) -> Result<Vec<Arc<MemoryShard>>> {
        match shard_id {
            Some(shard_id) => Ok(vec![self.shard(db_id, shard_id)?]),
            None => Ok(self.registry.list(db_id)),
        }
    }

    fn serve_one(&self, info: &DbShard) -> Result<()> {
        if self.registry.get(&info.db_id, &info.shard_id).is_some() {
            warn!(target: "vecshard::worker", shard_id = %info.shard_id, "shard already served");
            return Ok(());
        }

        let shard = Arc::new(MemoryShard::new(
            info.clone(),
            Arc::clone(&self.driver),
            self.config.load_page_size,
            self.config.mailbox_capacity,
        ));
        shard.start()?;
        let loaded = match shard.load() {
            Ok(n) => n,
            Err(e) => {
                shard.stop();
                return Err(e);
            }
        };
        if info.is_closed {
            shard.close()?;
        }

        if !self.registry.insert(Arc::clone(&shard)) {
            // Lost a race with a concurrent serve of the same shard.
            shard.stop();
            return Ok(());
        }
        info!(
            target: "vecshard::worker",
            worker_id = %self.worker_id,
            db_id = %info.db_id,
            shard_id = %info.shard_id,
            loaded,
            "serving shard"
        );
        Ok(())
    }
}

impl SearchWorker for BruteForceWorker {
    fn worker_id(&self) -> String {
        self.worker_id.clone()
    }

    fn capacity(&self) -> u64 {
        self.config.capacity
    }

    fn start(&self) -> Result<()> {
        for shard in self.registry.all() {
            shard.start()?;
        }
        info!(target: "vecshard::worker", worker_id = %self.worker_id, "worker started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        for shard in self.registry.all() {
            if shard.is_running() {
                shard.stop();
            }
        }
        info!(target: "vecshard::worker", worker_id = %self.worker_id, "worker stopped");
        Ok(())
    }

    fn train_index(&self) -> Result<()> {
        debug!(target: "vecshard::worker", "brute force worker has no index to train");
        Ok(())
    }

    fn serve_shards(&self, shards: &[DbShard]) -> Result<()> {
        for info in shards {
            self.serve_one(info)?;
        }
        Ok(())
    }

    fn close_shards(&self, shards: &[DbShard]) -> Result<()> {
        for info in shards {
            self.shard(&info.db_id, &info.shard_id)?.close()?;
        }
        Ok(())
    }

    fn list_shards(&self) -> Result<Vec<DbShard>> {
        self.registry.all().iter().map(|shard| shard.info()).collect()
    }

    fn add_features(
        &self,
        db_id: &str,
        shard_id: &str,
        items: &[FeatureDbItem],
    ) -> Result<Vec<String>> {
        self.shard(db_id, shard_id)?.add_features(items.to_vec())
    }

    fn remove_features(
        &self,
        db_id: &str,
        shard_id: Option<&str>,
        ids: &[String],
    ) -> Result<usize> {
        let mut removed = 0;
        for shard in self.scoped(db_id, shard_id)? {
            removed += shard.remove_features(ids.to_vec())?;
        }
        Ok(removed)
    }

    fn search_feature(
        &self,
        db_id: &str,
        shard_id: Option<&str>,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>> {
        let shards = self.scoped(db_id, shard_id)?;
        if shards.is_empty() {
            warn!(target: "vecshard::worker", db_id, "search on db with no served shards");
            return Ok(Vec::new());
        }

        let mut rank = FeatureTopkRanking::new(query, k);
        for shard in shards {
            rank.feed_all(shard.search_feature(query, k)?);
        }
        Ok(rank.sort_out())
    }

    fn system_info(&self) -> Result<WorkerInfo> {
        let shards = self.registry.all();
        let mut features = 0;
        for shard in &shards {
            features += shard.info()?.used;
        }
        Ok(WorkerInfo {
            worker_id: self.worker_id.clone(),
            capacity: self.config.capacity,
            shards: shards.len() as u64,
            features,
        })
    }
}

impl Drop for BruteForceWorker {
    fn drop(&mut self) {
        for shard in self.registry.all() {
            if shard.is_running() {
                shard.stop();
            }
        }
    }
}
