//! Metadata catalog shared by the drivers
//!
//! The catalog holds every database, shard and worker record plus one row
//! per stored feature (id, owning shard, metadata). Vectors themselves are
//! kept by the driver, in memory or on disk. Feature rows are keyed by an
//! insertion sequence so that listings page in a stable order.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vecshard_core::{DbItem, DbShard, Error, Metadata, PageData, Result, WorkerItem};

/// A database record plus its soft-delete flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DbRecord {
    pub item: DbItem,
    pub is_deleted: bool,
}

/// Catalog row for one stored feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FeatureRow {
    pub feature_id: String,
    pub shard_id: String,
    pub metadata: Metadata,
}

/// Feature rows of one database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct FeatureTable {
    next_seq: u64,
    rows: BTreeMap<u64, FeatureRow>,
    #[serde(skip)]
    by_id: HashMap<String, u64>,
}

impl FeatureTable {
    fn rebuild_index(&mut self) {
        self.by_id = self
            .rows
            .iter()
            .map(|(seq, row)| (row.feature_id.clone(), *seq))
            .collect();
    }

    fn insert(&mut self, row: FeatureRow) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(row.feature_id.clone(), seq);
        self.rows.insert(seq, row);
    }

    fn get(&self, feature_id: &str) -> Option<&FeatureRow> {
        self.by_id.get(feature_id).and_then(|seq| self.rows.get(seq))
    }

    fn remove(&mut self, feature_id: &str, shard_id: Option<&str>) -> bool {
        let Some(seq) = self.by_id.get(feature_id).copied() else {
            return false;
        };
        let in_scope = match (self.rows.get(&seq), shard_id) {
            (Some(row), Some(shard)) => row.shard_id == shard,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !in_scope {
            return false;
        }
        self.by_id.remove(feature_id);
        self.rows.remove(&seq).is_some()
    }

    fn len(&self) -> u64 {
        self.rows.len() as u64
    }
}

/// One replayable catalog mutation. Ids are assigned before the operation
/// is built, so applying it twice from a journal yields the same catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum CatalogOp {
    Init { db_ids: Vec<String> },
    CreateDb { db: DbItem },
    DeleteDb { db_id: String },
    PutWorker { worker: WorkerItem },
    UpdateWorker { worker: WorkerItem },
    CreateShard { shard: DbShard },
    UpdateShard { shard: DbShard },
    CloseShard { db_id: String, shard_id: String },
    AddRows { db_id: String, rows: Vec<FeatureRow> },
    RemoveRows {
        db_id: String,
        shard_id: Option<String>,
        ids: Vec<String>,
    },
}

/// All metadata a driver persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Catalog {
    dbs: BTreeMap<String, DbRecord>,
    /// Shards per database, in creation order
    shards: BTreeMap<String, Vec<DbShard>>,
    workers: BTreeMap<String, WorkerItem>,
    features: BTreeMap<String, FeatureTable>,
}

impl Catalog {
    /// Rebuild the in-memory lookup maps after deserialization.
    pub fn rebuild_indexes(&mut self) {
        for table in self.features.values_mut() {
            table.rebuild_index();
        }
    }

    pub fn init(&mut self, known_db_ids: &[String]) {
        for db_id in known_db_ids {
            self.features.entry(db_id.clone()).or_default();
        }
    }

    // ========================================================================
    // Databases
    // ========================================================================

    /// A database record with a fresh id, ready to insert.
    pub fn prepare_db(db: &DbItem) -> DbItem {
        let mut item = db.clone();
        item.db_id = Uuid::new_v4().to_string();
        item.used = 0;
        item
    }

    pub fn create_db(&mut self, db: &DbItem) -> String {
        let item = Self::prepare_db(db);
        let db_id = item.db_id.clone();
        self.insert_db(item);
        db_id
    }

    fn insert_db(&mut self, item: DbItem) {
        let db_id = item.db_id.clone();
        self.dbs.insert(
            db_id.clone(),
            DbRecord {
                item,
                is_deleted: false,
            },
        );
        self.features.entry(db_id.clone()).or_default();
        self.shards.entry(db_id).or_default();
    }

    pub fn find_db(&self, db_id: &str) -> Result<DbItem> {
        match self.dbs.get(db_id) {
            Some(record) if !record.is_deleted => Ok(record.item.clone()),
            _ => Err(Error::DbNotFound {
                db_id: db_id.to_string(),
            }),
        }
    }

    pub fn list_dbs(&self) -> Vec<DbItem> {
        self.dbs
            .values()
            .filter(|record| !record.is_deleted)
            .map(|record| record.item.clone())
            .collect()
    }

    pub fn delete_db(&mut self, db_id: &str) -> Result<()> {
        match self.dbs.get_mut(db_id) {
            Some(record) if !record.is_deleted => {
                record.is_deleted = true;
                Ok(())
            }
            _ => Err(Error::DbNotFound {
                db_id: db_id.to_string(),
            }),
        }
    }

    // ========================================================================
    // Workers
    // ========================================================================

    pub fn list_workers(&self) -> Vec<WorkerItem> {
        self.workers.values().cloned().collect()
    }

    pub fn put_worker(&mut self, worker: &WorkerItem) -> Result<()> {
        if worker.worker_id.is_empty() {
            return Err(Error::invalid_input("worker record without worker_id"));
        }
        self.workers
            .insert(worker.worker_id.clone(), worker.clone());
        Ok(())
    }

    pub fn update_worker(&mut self, worker: &WorkerItem) -> Result<()> {
        match self.workers.get_mut(&worker.worker_id) {
            Some(existing) => {
                *existing = worker.clone();
                Ok(())
            }
            None => Err(Error::WorkerNotFound {
                worker_id: worker.worker_id.clone(),
            }),
        }
    }

    // ========================================================================
    // Shards
    // ========================================================================

    pub fn list_shards(&self, db_id: &str) -> Result<Vec<DbShard>> {
        self.find_db(db_id)?;
        Ok(self.shards.get(db_id).cloned().unwrap_or_default())
    }

    /// A shard record of `db_id` with a fresh id, ready to insert.
    pub fn prepare_shard(db_id: &str, shard: &DbShard) -> DbShard {
        let mut record = shard.clone();
        record.db_id = db_id.to_string();
        record.shard_id = Uuid::new_v4().to_string();
        record
    }

    pub fn create_shard(&mut self, db_id: &str, shard: &DbShard) -> Result<String> {
        let record = Self::prepare_shard(db_id, shard);
        let shard_id = record.shard_id.clone();
        self.insert_shard(record)?;
        Ok(shard_id)
    }

    fn insert_shard(&mut self, record: DbShard) -> Result<()> {
        self.find_db(&record.db_id)?;
        self.shards
            .entry(record.db_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    pub fn update_shard(&mut self, shard: &DbShard) -> Result<()> {
        let record = self.shard_mut(&shard.db_id, &shard.shard_id)?;
        *record = shard.clone();
        Ok(())
    }

    pub fn close_shard(&mut self, db_id: &str, shard_id: &str) -> Result<()> {
        self.shard_mut(db_id, shard_id)?.is_closed = true;
        Ok(())
    }

    fn shard(&self, db_id: &str, shard_id: &str) -> Result<&DbShard> {
        self.shards
            .get(db_id)
            .and_then(|shards| shards.iter().find(|s| s.shard_id == shard_id))
            .ok_or_else(|| Error::ShardNotFound {
                db_id: db_id.to_string(),
                shard_id: shard_id.to_string(),
            })
    }

    fn shard_mut(&mut self, db_id: &str, shard_id: &str) -> Result<&mut DbShard> {
        self.shards
            .get_mut(db_id)
            .and_then(|shards| shards.iter_mut().find(|s| s.shard_id == shard_id))
            .ok_or_else(|| Error::ShardNotFound {
                db_id: db_id.to_string(),
                shard_id: shard_id.to_string(),
            })
    }

    // ========================================================================
    // Feature rows
    // ========================================================================

    fn table(&self, db_id: &str) -> Result<&FeatureTable> {
        self.features.get(db_id).ok_or_else(|| Error::DbNotFound {
            db_id: db_id.to_string(),
        })
    }

    fn table_mut(&mut self, db_id: &str) -> Result<&mut FeatureTable> {
        self.features
            .get_mut(db_id)
            .ok_or_else(|| Error::DbNotFound {
                db_id: db_id.to_string(),
            })
    }

    /// Select one page of rows, optionally restricted to a shard.
    ///
    /// Returns an empty page with `total_page == 0` when nothing matches.
    pub fn page_rows(
        &self,
        page: u64,
        per_page: u64,
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<PageData<Vec<FeatureRow>>> {
        if per_page == 0 {
            return Err(Error::invalid_input("per_page must be positive"));
        }
        let table = self.table(db_id)?;
        let in_scope =
            |row: &&FeatureRow| shard_id.map_or(true, |shard| row.shard_id == shard);

        let count = table.rows.values().filter(in_scope).count() as u64;
        let offset = page.saturating_mul(per_page);
        let data = if offset >= count {
            Vec::new()
        } else {
            table
                .rows
                .values()
                .filter(in_scope)
                .skip(offset as usize)
                .take(per_page as usize)
                .cloned()
                .collect()
        };

        Ok(PageData {
            page,
            per_page,
            total_page: PageData::<()>::total_pages(count, per_page),
            data,
        })
    }

    /// Rows with fresh feature ids, ready to insert.
    pub fn prepare_rows(metadata: Vec<Metadata>, shard_id: &str) -> Vec<FeatureRow> {
        metadata
            .into_iter()
            .map(|metadata| FeatureRow {
                feature_id: Uuid::new_v4().to_string(),
                shard_id: shard_id.to_string(),
                metadata,
            })
            .collect()
    }

    /// Record new rows and return their freshly assigned ids.
    pub fn add_rows(
        &mut self,
        metadata: Vec<Metadata>,
        db_id: &str,
        shard_id: &str,
    ) -> Result<Vec<String>> {
        let rows = Self::prepare_rows(metadata, shard_id);
        let ids = rows.iter().map(|row| row.feature_id.clone()).collect();
        self.insert_rows(db_id, rows)?;
        Ok(ids)
    }

    fn insert_rows(&mut self, db_id: &str, rows: Vec<FeatureRow>) -> Result<()> {
        let table = self.table_mut(db_id)?;
        for row in rows {
            table.insert(row);
        }
        self.sync_db_used(db_id);
        Ok(())
    }

    /// Ids among `ids` that exist in the db (and shard, if given), in input order.
    pub fn existing_ids(
        &self,
        ids: &[String],
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<Vec<String>> {
        let table = self.table(db_id)?;
        Ok(ids
            .iter()
            .filter(|id| {
                table
                    .get(id)
                    .map_or(false, |row| shard_id.map_or(true, |s| row.shard_id == s))
            })
            .cloned()
            .collect())
    }

    /// Remove rows; ids outside the db/shard scope are ignored.
    pub fn remove_rows(
        &mut self,
        ids: &[String],
        db_id: &str,
        shard_id: Option<&str>,
    ) -> Result<Vec<String>> {
        let table = self.table_mut(db_id)?;
        let removed: Vec<String> = ids
            .iter()
            .filter(|id| table.remove(id, shard_id))
            .cloned()
            .collect();
        self.sync_db_used(db_id);
        Ok(removed)
    }

    // ========================================================================
    // Journaled mutations
    // ========================================================================

    /// Fail exactly when [`apply`](Self::apply) would, without mutating.
    pub fn check(&self, op: &CatalogOp) -> Result<()> {
        match op {
            CatalogOp::Init { .. } | CatalogOp::CreateDb { .. } => Ok(()),
            CatalogOp::DeleteDb { db_id } => self.find_db(db_id).map(drop),
            CatalogOp::PutWorker { worker } => {
                if worker.worker_id.is_empty() {
                    return Err(Error::invalid_input("worker record without worker_id"));
                }
                Ok(())
            }
            CatalogOp::UpdateWorker { worker } => {
                if self.workers.contains_key(&worker.worker_id) {
                    Ok(())
                } else {
                    Err(Error::WorkerNotFound {
                        worker_id: worker.worker_id.clone(),
                    })
                }
            }
            CatalogOp::CreateShard { shard } => self.find_db(&shard.db_id).map(drop),
            CatalogOp::UpdateShard { shard } => {
                self.shard(&shard.db_id, &shard.shard_id).map(drop)
            }
            CatalogOp::CloseShard { db_id, shard_id } => self.shard(db_id, shard_id).map(drop),
            CatalogOp::AddRows { db_id, .. } | CatalogOp::RemoveRows { db_id, .. } => {
                self.table(db_id).map(drop)
            }
        }
    }

    /// Apply one mutation. A failing operation leaves the catalog unchanged.
    pub fn apply(&mut self, op: &CatalogOp) -> Result<()> {
        match op {
            CatalogOp::Init { db_ids } => {
                self.init(db_ids);
                Ok(())
            }
            CatalogOp::CreateDb { db } => {
                self.insert_db(db.clone());
                Ok(())
            }
            CatalogOp::DeleteDb { db_id } => self.delete_db(db_id),
            CatalogOp::PutWorker { worker } => self.put_worker(worker),
            CatalogOp::UpdateWorker { worker } => self.update_worker(worker),
            CatalogOp::CreateShard { shard } => self.insert_shard(shard.clone()),
            CatalogOp::UpdateShard { shard } => self.update_shard(shard),
            CatalogOp::CloseShard { db_id, shard_id } => self.close_shard(db_id, shard_id),
            CatalogOp::AddRows { db_id, rows } => self.insert_rows(db_id, rows.clone()),
            CatalogOp::RemoveRows {
                db_id,
                shard_id,
                ids,
            } => self
                .remove_rows(ids, db_id, shard_id.as_deref())
                .map(drop),
        }
    }

    fn sync_db_used(&mut self, db_id: &str) {
        let count = self.features.get(db_id).map_or(0, FeatureTable::len);
        if let Some(record) = self.dbs.get_mut(db_id) {
            record.item.used = count;
        }
    }
}
