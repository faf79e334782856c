//! Coordinator: the manager's public entry point
//!
//! The coordinator owns the worker manager and the shard directory. Writes
//! go to the database's writable shard (creating and placing one when
//! needed); searches fan out to every shard of the database and the
//! per-shard results are merged into one top-k.
//!
//! A `feature_id → (db_id, shard_id)` index routes removals to the shard
//! that holds each feature. The index only knows features added through
//! this coordinator instance: ids it has never seen are offered to every
//! assigned shard of the database.
//!
//! Every vector of a database has the same dimension: the first stored
//! feature fixes it, and writes or queries of another dimension are
//! rejected with `Protocol`.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use vecshard_core::limits::SEARCH_OVERFETCH_FACTOR;
use vecshard_core::{
    DbItem, DbShard, Error, Feature, FeatureDbItem, FeatureSearchItem, FeatureTopkRanking,
    PageData, Result,
};
use vecshard_storage::{open_driver, Driver};

use crate::config::ManagerConfig;
use crate::connector::WorkerConnector;
use crate::shard::Shard;
use crate::shard_manager::ShardManager;
use crate::worker_manager::WorkerManager;

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Routes reads and writes across shards and workers.
pub struct Coordinator {
    driver: Arc<dyn Driver>,
    workers: WorkerManager,
    shards: ShardManager,
    index: DashMap<String, (String, String)>,
    dimensions: DashMap<String, usize>,
}

impl Coordinator {
    /// Build a coordinator over an already opened driver. Nothing is
    /// loaded or connected until [`start`](Self::start).
    pub fn new(
        config: &ManagerConfig,
        driver: Arc<dyn Driver>,
        connector: Arc<dyn WorkerConnector>,
    ) -> Self {
        let workers = WorkerManager::new(config.worker_settings(), Arc::clone(&driver), connector);
        let shards = ShardManager::new(
            config.shard_settings(),
            Arc::clone(&driver),
            workers.registry(),
        );
        Coordinator {
            driver,
            workers,
            shards,
            index: DashMap::new(),
            dimensions: DashMap::new(),
        }
    }

    /// Open the configured driver and build a coordinator over it.
    pub fn open(config: &ManagerConfig, connector: Arc<dyn WorkerConnector>) -> Result<Self> {
        config.validate()?;
        let driver = open_driver(&config.driver)?;
        Ok(Self::new(config, driver, connector))
    }

    /// Connect known workers, load the shard directory and give every shard
    /// a worker: the one it was assigned to before, if that worker is
    /// registered, otherwise the placement choice.
    ///
    /// Shards that cannot be placed yet stay unassigned and are retried on
    /// the next write or search that reaches them.
    pub fn start(&self) -> Result<()> {
        let workers = self.workers.load_known_workers()?;
        let shards = self.shards.load()?;

        let mut unassigned = 0;
        for shard in self.shards.all_shards() {
            if let Err(e) = self.ensure_assigned(&shard) {
                warn!(
                    target: "vecshard::coordinator",
                    shard_id = %shard.shard_id(),
                    error = %e,
                    "shard left unassigned"
                );
                unassigned += 1;
            }
        }
        info!(target: "vecshard::coordinator", workers, shards, unassigned, "coordinator started");
        Ok(())
    }

    /// Stop background loops and shard actors. Idempotent.
    pub fn stop(&self) {
        self.workers.stop();
        self.shards.shutdown();
        debug!(target: "vecshard::coordinator", "coordinator stopped");
    }

    /// The worker manager.
    pub fn worker_manager(&self) -> &WorkerManager {
        &self.workers
    }

    /// The shard directory.
    pub fn shard_manager(&self) -> &ShardManager {
        &self.shards
    }

    /// The metadata driver.
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    fn ensure_assigned(&self, shard: &Shard) -> Result<()> {
        if shard.has_worker() {
            return Ok(());
        }
        let registry = self.workers.registry();
        let (worker, placed) = match shard.persisted_worker_id().and_then(|id| registry.get(id)) {
            Some(worker) => (worker, false),
            None => (self.workers.find_writable_worker(shard.info().capacity)?, true),
        };
        match shard.assign_worker(worker.worker_id()) {
            Ok(()) | Err(Error::WorkerAlreadyAssigned { .. }) => Ok(()),
            // Another shard took the room between placement and assignment.
            Err(Error::Capacity { .. }) if placed => Err(Error::NoWorkerAvailable),
            Err(e) => Err(e),
        }
    }

    /// Dimension of the vectors stored in `db_id`, if it holds any.
    fn db_dimension(&self, db_id: &str) -> Result<Option<usize>> {
        if let Some(dimension) = self.dimensions.get(db_id) {
            return Ok(Some(*dimension));
        }
        let first = self.driver.list_features(0, 1, db_id, None)?;
        Ok(first.data.first().map(|item| {
            *self
                .dimensions
                .entry(db_id.to_string())
                .or_insert(item.feature.dimension())
        }))
    }

    fn check_dimension(&self, db_id: &str, dimension: usize) -> Result<()> {
        match self.db_dimension(db_id)? {
            Some(expected) if expected != dimension => Err(Error::Protocol(format!(
                "dimension mismatch in {}: expected {}, got {}",
                db_id, expected, dimension
            ))),
            _ => Ok(()),
        }
    }

    // ---- databases ----

    /// Create a database. Returns its id.
    pub fn create_db(&self, db: &DbItem) -> Result<String> {
        self.shards.create_db(db)
    }

    /// Look up a database.
    pub fn find_db(&self, db_id: &str) -> Result<DbItem> {
        self.shards.find_db(db_id)
    }

    /// Every live database.
    pub fn list_dbs(&self) -> Result<Vec<DbItem>> {
        self.shards.list_dbs()
    }

    /// Soft-delete a database.
    pub fn delete_db(&self, db_id: &str) -> Result<()> {
        self.shards.delete_db(db_id)?;
        self.index.retain(|_, (db, _)| db != db_id);
        self.dimensions.remove(db_id);
        Ok(())
    }

    /// Shard records of a database.
    pub fn list_shards(&self, db_id: &str) -> Result<Vec<DbShard>> {
        self.shards.list_shards(db_id)
    }

    /// One page (0-based) of the features stored in a database.
    pub fn list_features(
        &self,
        db_id: &str,
        page: u64,
        per_page: u64,
    ) -> Result<PageData<Vec<FeatureDbItem>>> {
        self.shards.shards(db_id)?;
        self.driver.list_features(page, per_page, db_id, None)
    }

    /// One page (0-based) of the features stored in one shard.
    pub fn list_shard_features(
        &self,
        db_id: &str,
        shard_id: &str,
        page: u64,
        per_page: u64,
    ) -> Result<PageData<Vec<FeatureDbItem>>> {
        self.shards.get_shard(db_id, shard_id)?;
        self.driver.list_features(page, per_page, db_id, Some(shard_id))
    }

    // ---- features ----

    /// Store features without metadata. Returns their ids, in input order.
    pub fn add_features(&self, db_id: &str, features: Vec<Feature>) -> Result<Vec<String>> {
        self.add_feature_items(db_id, features.into_iter().map(FeatureDbItem::new).collect())
    }

    /// Store features with metadata in the database's writable shard.
    ///
    /// Fails with `NoWorkerAvailable` when a new shard cannot be placed,
    /// with `Capacity` when the batch is larger than a whole shard and with
    /// `Protocol` when a vector's dimension differs from the database's.
    pub fn add_feature_items(&self, db_id: &str, items: Vec<FeatureDbItem>) -> Result<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        for item in &items {
            check_vector(&item.feature, "store")?;
        }
        let dimension = items[0].feature.dimension();
        if items.iter().any(|item| item.feature.dimension() != dimension) {
            return Err(Error::Protocol(
                "batch mixes vectors of different dimensions".into(),
            ));
        }
        self.shards.shards(db_id)?;
        self.check_dimension(db_id, dimension)?;

        // A concurrent writer can fill or close the shard between the lookup
        // and the write; look again a bounded number of times.
        let mut attempts = 0;
        let (shard, created, ids) = loop {
            attempts += 1;
            let (shard, created) = self
                .shards
                .find_or_create_writable_shard(db_id, items.len() as u64)?;
            self.ensure_assigned(&shard)?;
            match shard.add_features(items.clone()) {
                Ok(ids) => break (shard, created, ids),
                Err(Error::Capacity { .. }) | Err(Error::ShardClosed { .. })
                    if attempts < MAX_WRITE_ATTEMPTS =>
                {
                    debug!(target: "vecshard::coordinator", shard_id = %shard.shard_id(), "shard filled concurrently, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        self.dimensions
            .entry(db_id.to_string())
            .or_insert(dimension);
        let shard_id = shard.shard_id();
        for id in &ids {
            self.index
                .insert(id.clone(), (db_id.to_string(), shard_id.clone()));
        }
        debug!(
            target: "vecshard::coordinator",
            db_id = %db_id,
            shard_id = %shard_id,
            created,
            added = ids.len(),
            "features added"
        );
        Ok(ids)
    }

    /// Delete features by id. Returns how many were removed; unknown ids
    /// are ignored.
    pub fn remove_features(&self, db_id: &str, ids: &[String]) -> Result<usize> {
        let shards = self.shards.shards(db_id)?;

        let mut routed: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut unrouted = Vec::new();
        for id in ids {
            match self.index.get(id) {
                Some(entry) if entry.0 == db_id => {
                    routed.entry(entry.1.clone()).or_default().push(id.clone());
                }
                _ => unrouted.push(id.clone()),
            }
        }

        let mut removed = 0;
        for (shard_id, ids) in routed {
            match shards.iter().find(|s| s.shard_id() == shard_id) {
                Some(shard) => removed += shard.remove_features(ids)?,
                None => unrouted.extend(ids),
            }
        }
        if !unrouted.is_empty() {
            for shard in shards.iter().filter(|s| s.has_worker()) {
                removed += shard.remove_features(unrouted.clone())?;
            }
        }

        for id in ids {
            self.index.remove(id);
        }
        debug!(target: "vecshard::coordinator", db_id = %db_id, requested = ids.len(), removed, "features removed");
        Ok(removed)
    }

    /// The `k` stored features most similar to `query`, best first.
    ///
    /// Every shard is asked for its top `2k`, searched in parallel, and the
    /// union is ranked once more.
    pub fn search_feature(
        &self,
        db_id: &str,
        query: &Feature,
        k: usize,
    ) -> Result<Vec<FeatureSearchItem>> {
        let shards = self.shards.shards(db_id)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        check_vector(query, "search with")?;
        self.check_dimension(db_id, query.dimension())?;

        let per_shard = k.saturating_mul(SEARCH_OVERFETCH_FACTOR);
        let results = shards
            .par_iter()
            .map(|shard| {
                if !shard.has_worker() {
                    if shard.info().used == 0 {
                        return Ok(Vec::new());
                    }
                    self.ensure_assigned(shard)?;
                }
                shard.search_feature(query, per_shard)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rank = FeatureTopkRanking::new(query, k);
        rank.feed_all(results.into_iter().flatten());
        Ok(rank.sort_out())
    }
}

fn check_vector(feature: &Feature, action: &str) -> Result<()> {
    if !feature.is_finite() {
        return Err(Error::invalid_input(format!(
            "cannot {} a vector with NaN or infinite components",
            action
        )));
    }
    if feature.is_zero() {
        return Err(Error::invalid_input(format!("cannot {} a zero vector", action)));
    }
    Ok(())
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
