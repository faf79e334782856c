//! Shards served by one worker, keyed by database then shard id

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::memory_shard::MemoryShard;

/// Directory of the shards a worker serves.
#[derive(Default)]
pub struct ShardRegistry {
    shards: RwLock<BTreeMap<String, BTreeMap<String, Arc<MemoryShard>>>>,
}

impl ShardRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shard. Returns false (and keeps the existing entry) if the
    /// shard is already registered.
    pub fn insert(&self, shard: Arc<MemoryShard>) -> bool {
        let mut shards = self.shards.write();
        let db = shards.entry(shard.db_id().to_string()).or_default();
        if db.contains_key(shard.shard_id()) {
            return false;
        }
        db.insert(shard.shard_id().to_string(), shard);
        true
    }

    /// Look up one shard.
    pub fn get(&self, db_id: &str, shard_id: &str) -> Option<Arc<MemoryShard>> {
        self.shards
            .read()
            .get(db_id)
            .and_then(|db| db.get(shard_id))
            .cloned()
    }

    /// Shards of one database.
    pub fn list(&self, db_id: &str) -> Vec<Arc<MemoryShard>> {
        self.shards
            .read()
            .get(db_id)
            .map(|db| db.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every registered shard.
    pub fn all(&self) -> Vec<Arc<MemoryShard>> {
        self.shards
            .read()
            .values()
            .flat_map(|db| db.values().cloned())
            .collect()
    }

    /// Number of registered shards.
    pub fn len(&self) -> usize {
        self.shards.read().values().map(BTreeMap::len).sum()
    }

    /// True if no shard is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
