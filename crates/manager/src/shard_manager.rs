//! Shard directory
//!
//! The [`ShardManager`] owns every manager-side [`Shard`] actor, grouped by
//! database in creation order. The directory is loaded once from the
//! driver; afterwards every mutation goes through the driver first and the
//! directory second. Shard creation is serialized by its own lock so that
//! concurrent writers that all need room never create more than one shard.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use vecshard_core::{DbItem, DbShard, Error, Result};
use vecshard_storage::Driver;

use crate::shard::Shard;
use crate::worker_manager::WorkerRegistry;

/// Sizing for shards created by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSettings {
    /// Capacity of every new shard
    pub shard_capacity: u64,
    /// Mailbox size of each shard actor
    pub mailbox_capacity: usize,
}

impl Default for ShardSettings {
    fn default() -> Self {
        ShardSettings {
            shard_capacity: vecshard_core::limits::DEFAULT_SHARD_CAPACITY,
            mailbox_capacity: vecshard_core::limits::DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Every shard actor, by database.
pub struct ShardManager {
    settings: ShardSettings,
    driver: Arc<dyn Driver>,
    workers: Arc<WorkerRegistry>,
    dirs: RwLock<BTreeMap<String, Vec<Arc<Shard>>>>,
    create_lock: Mutex<()>,
}

impl ShardManager {
    /// Create an empty directory.
    pub fn new(settings: ShardSettings, driver: Arc<dyn Driver>, workers: Arc<WorkerRegistry>) -> Self {
        ShardManager {
            settings,
            driver,
            workers,
            dirs: RwLock::new(BTreeMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    /// Configured shard sizing.
    pub fn settings(&self) -> ShardSettings {
        self.settings
    }

    fn spawn(&self, info: DbShard) -> Result<Arc<Shard>> {
        let shard = Arc::new(Shard::new(
            info,
            Arc::clone(&self.workers),
            Arc::clone(&self.driver),
            self.settings.mailbox_capacity,
        ));
        shard.start()?;
        Ok(shard)
    }

    /// Load every live database and its shards, starting one actor per
    /// shard. Returns the number of shards loaded.
    pub fn load(&self) -> Result<usize> {
        let dbs = self.driver.list_dbs()?;
        let db_ids: Vec<String> = dbs.iter().map(|db| db.db_id.clone()).collect();
        self.driver.init(&db_ids)?;

        let mut loaded = BTreeMap::new();
        let mut count = 0;
        for db_id in db_ids {
            let shards = self
                .driver
                .list_shards(&db_id)?
                .into_iter()
                .map(|info| self.spawn(info))
                .collect::<Result<Vec<_>>>()?;
            count += shards.len();
            loaded.insert(db_id, shards);
        }

        let replaced = std::mem::replace(&mut *self.dirs.write(), loaded);
        for shard in replaced.values().flatten() {
            shard.stop();
        }
        info!(target: "vecshard::coordinator", dbs = self.dirs.read().len(), shards = count, "shard directory loaded");
        Ok(count)
    }

    // ---- databases ----

    /// Create a database with no shards. Returns its id.
    pub fn create_db(&self, db: &DbItem) -> Result<String> {
        let db_id = self.driver.create_db(db)?;
        self.dirs.write().insert(db_id.clone(), Vec::new());
        info!(target: "vecshard::coordinator", db_id = %db_id, name = %db.name, "db created");
        Ok(db_id)
    }

    /// Look up a database.
    pub fn find_db(&self, db_id: &str) -> Result<DbItem> {
        self.driver.find_db(db_id)
    }

    /// Every live database.
    pub fn list_dbs(&self) -> Result<Vec<DbItem>> {
        self.driver.list_dbs()
    }

    /// Soft-delete a database and stop its shard actors.
    pub fn delete_db(&self, db_id: &str) -> Result<()> {
        self.driver.delete_db(db_id)?;
        let removed = self.dirs.write().remove(db_id).unwrap_or_default();
        for shard in &removed {
            shard.stop();
        }
        info!(target: "vecshard::coordinator", db_id = %db_id, shards = removed.len(), "db deleted");
        Ok(())
    }

    // ---- shards ----

    /// Shard actors of a database, in creation order. `DbNotFound` for an
    /// unknown database.
    pub fn shards(&self, db_id: &str) -> Result<Vec<Arc<Shard>>> {
        self.dirs
            .read()
            .get(db_id)
            .cloned()
            .ok_or_else(|| Error::DbNotFound {
                db_id: db_id.to_string(),
            })
    }

    /// Every shard actor of every database.
    pub fn all_shards(&self) -> Vec<Arc<Shard>> {
        self.dirs.read().values().flatten().cloned().collect()
    }

    /// Shard records of a database.
    pub fn list_shards(&self, db_id: &str) -> Result<Vec<DbShard>> {
        Ok(self.shards(db_id)?.iter().map(|s| s.info()).collect())
    }

    /// Look up one shard actor.
    pub fn get_shard(&self, db_id: &str, shard_id: &str) -> Result<Arc<Shard>> {
        self.shards(db_id)?
            .into_iter()
            .find(|s| s.shard_id() == shard_id)
            .ok_or_else(|| Error::ShardNotFound {
                db_id: db_id.to_string(),
                shard_id: shard_id.to_string(),
            })
    }

    /// Persist a new shard and start its actor.
    pub fn create_shard(&self, db_id: &str, capacity: u64) -> Result<Arc<Shard>> {
        let _guard = self.create_lock.lock();
        self.create_shard_locked(db_id, capacity)
    }

    fn create_shard_locked(&self, db_id: &str, capacity: u64) -> Result<Arc<Shard>> {
        if !self.dirs.read().contains_key(db_id) {
            return Err(Error::DbNotFound {
                db_id: db_id.to_string(),
            });
        }

        let mut info = DbShard::new(db_id, capacity);
        info.shard_id = self.driver.create_shard(db_id, &info)?;
        let shard = self.spawn(info)?;

        match self.dirs.write().get_mut(db_id) {
            Some(shards) => shards.push(Arc::clone(&shard)),
            None => {
                shard.stop();
                return Err(Error::DbNotFound {
                    db_id: db_id.to_string(),
                });
            }
        }
        info!(
            target: "vecshard::coordinator",
            db_id = %db_id,
            shard_id = %shard.shard_id(),
            capacity,
            "shard created"
        );
        Ok(shard)
    }

    /// Re-persist a shard's current record.
    pub fn update_shard(&self, db_id: &str, shard_id: &str) -> Result<()> {
        let shard = self.get_shard(db_id, shard_id)?;
        self.driver.update_shard(&shard.info())
    }

    /// Close a shard: no further writes, reads still served.
    pub fn close_shard(&self, db_id: &str, shard_id: &str) -> Result<()> {
        self.get_shard(db_id, shard_id)?.close()
    }

    /// An open shard with room for strictly more than `count` features,
    /// creating one if needed. The flag is true when the shard was just
    /// created and still has to be placed on a worker.
    ///
    /// Open shards that lack room are closed on the way.
    pub fn find_or_create_writable_shard(
        &self,
        db_id: &str,
        count: u64,
    ) -> Result<(Arc<Shard>, bool)> {
        let capacity = self.settings.shard_capacity;
        if count >= capacity {
            return Err(Error::Capacity {
                target: db_id.to_string(),
                capacity,
                used: 0,
                requested: count,
            });
        }

        let _guard = self.create_lock.lock();
        for shard in self.shards(db_id)? {
            let info = shard.info();
            if info.is_closed {
                continue;
            }
            if info.can_accept(count) {
                debug!(target: "vecshard::coordinator", shard_id = %info.shard_id, remaining = info.remaining(), "writable shard found");
                return Ok((shard, false));
            }
            if let Err(e) = shard.close() {
                warn!(target: "vecshard::coordinator", shard_id = %info.shard_id, error = %e, "failed to close full shard");
            }
        }

        let shard = self.create_shard_locked(db_id, capacity)?;
        Ok((shard, true))
    }

    /// Stop every shard actor.
    pub fn shutdown(&self) {
        let shards = self.all_shards();
        for shard in &shards {
            shard.stop();
        }
        debug!(target: "vecshard::coordinator", shards = shards.len(), "shard actors stopped");
    }
}

impl Drop for ShardManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
