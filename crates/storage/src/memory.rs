//! In-process driver
//!
//! Everything lives in one catalog plus a vector map behind a single
//! `RwLock`. Nothing survives the process; used by tests and by
//! single-process deployments.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;
use vecshard_core::{
    DbItem, DbShard, Feature, FeatureDbItem, Metadata, PageData, Result, WorkerItem,
};

use crate::catalog::Catalog;
use crate::driver::Driver;

#[derive(Default)]
struct MemoryState {
    catalog: Catalog,
    /// feature_id → vector (ids are globally unique)
    vectors: HashMap<String, Feature>,
}

/// Driver keeping all state in memory.
#[derive(Default)]
pub struct MemoryDriver {
    state: RwLock<MemoryState>,
}

impl MemoryDriver {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Driver for MemoryDriver {
    fn init(&self, known_db_ids: &[String]) -> Result<()> {
        self.state.write().catalog.init(known_db_ids);
        Ok(())
    }

    fn create_db(&self, db: &DbItem) -> Result<String> {
        let db_id = self.state.write().catalog.create_db(db);
        debug!(target: "vecshard::driver", db_id = %db_id, name = %db.name, "created db");
        Ok(db_id)
    }

    fn find_db(&self, db_id: &str) -> Result<DbItem> {
        self.state.read().catalog.find_db(db_id)
    }

    fn list_dbs(&self) -> Result<Vec<DbItem>> {
        Ok(self.state.read().catalog.list_dbs())
    }

    fn delete_db(&self, db_id: &str) -> Result<()> {
        self.state.write().catalog.delete_db(db_id)
    }

    fn list_workers(&self) -> Result<Vec<WorkerItem>> {
        Ok(self.state.read().catalog.list_workers())
    }

    fn create_worker(&self, worker: &WorkerItem) -> Result<()> {
        self.state.write().catalog.put_worker(worker)
    }

    fn update_worker(&self, worker: &WorkerItem) -> Result<()> {
        self.state.write().catalog.update_worker(worker)
    }

    fn list_shards(&self, db_id: &str) -> Result<Vec<DbShard>> {
        self.state.read().catalog.list_shards(db_id)
    }

    fn create_shard(&self, db_id: &str, shard: &DbShard) -> Result<String> {
        self.state.write().catalog.create_shard(db_id, shard)
    }

    fn update_shard(&self, shard: &DbShard) -> Result<()> {
        self.state.write().catalog.update_shard(shard)
    }

    fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()> {
        self.state.write().catalog.close_shard(db_id, shard_id)
    }

    fn list_features(
        &self,
        page: u64,
        per_page: u64,
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<PageData<Vec<FeatureDbItem>>> {
        let state = self.state.read();
        let rows = state.catalog.page_rows(page, per_page, db_id, shard_id)?;
        let data = rows
            .data
            .into_iter()
            .map(|row| FeatureDbItem {
                feature: state
                    .vectors
                    .get(&row.feature_id)
                    .cloned()
                    .unwrap_or_default(),
                feature_id: row.feature_id,
                metadata: row.metadata,
            })
            .collect();
        Ok(PageData {
            page: rows.page,
            per_page: rows.per_page,
            total_page: rows.total_page,
            data,
        })
    }

    fn add_features(
        &self,
        items: &[FeatureDbItem],
        db_id: &str,
        shard_id: &str,
    ) -> Result<Vec<String>> {
        let mut state = self.state.write();
        let metadata: Vec<Metadata> = items.iter().map(|item| item.metadata.clone()).collect();
        let ids = state.catalog.add_rows(metadata, db_id, shard_id)?;
        for (id, item) in ids.iter().zip(items) {
            state.vectors.insert(id.clone(), item.feature.clone());
        }
        Ok(ids)
    }

    fn load_features(&self, ids: &[String], db_id: &str, shard_id: &str) -> Result<Vec<Feature>> {
        let state = self.state.read();
        let found = state.catalog.existing_ids(ids, db_id, Some(shard_id))?;
        Ok(found
            .iter()
            .filter_map(|id| state.vectors.get(id).cloned())
            .collect())
    }

    fn remove_features(
        &self,
        ids: &[String],
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<usize> {
        let mut state = self.state.write();
        let removed = state.catalog.remove_rows(ids, db_id, shard_id)?;
        for id in &removed {
            state.vectors.remove(id);
        }
        Ok(removed.len())
    }
}
