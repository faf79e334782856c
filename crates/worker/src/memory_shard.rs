//! Worker-side shard: an in-memory feature cache behind an actor
//!
//! A [`MemoryShard`] owns the cached vectors of one shard. All access goes
//! through its actor, so loads, writes and scans of one shard never overlap.
//! Writes go to the driver first and only then to the cache, which keeps the
//! cache a subset of what is persisted.
//!
//! All vectors of a shard share one dimension; writes and queries of any
//! other dimension fail with `Protocol`.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};
use vecshard_concurrency::{Actor, Handler};
use vecshard_core::{
    DbShard, Error, Feature, FeatureDbItem, FeatureSearchItem, FeatureTopkRanking, Result,
};
use vecshard_storage::Driver;

/// Requests understood by the shard actor.
#[derive(Debug)]
pub enum ShardRequest {
    /// Page every stored feature of the shard into the cache
    Load,
    /// Persist and cache new features
    AddFeatures(Vec<FeatureDbItem>),
    /// Delete features by id
    RemoveFeatures(Vec<String>),
    /// Scan the cache for the `k` best matches
    SearchFeature {
        /// Query vector
        query: Feature,
        /// Result count
        k: usize,
    },
    /// Stop accepting writes
    Close,
    /// Current shard record (`used` = cached features)
    Info,
}

/// Replies, one variant per request.
#[derive(Debug)]
pub enum ShardReply {
    /// Number of features cached after loading
    Loaded(usize),
    /// Ids assigned to the added features
    Added(Vec<String>),
    /// Number of features removed
    Removed(usize),
    /// Search hits, best first
    Hits(Vec<FeatureSearchItem>),
    /// Close acknowledged
    Closed,
    /// Shard record snapshot
    Info(DbShard),
}

/// State owned by the shard's actor thread.
pub struct ShardCache {
    info: DbShard,
    driver: Arc<dyn Driver>,
    page_size: u64,
    loaded: bool,
    features: BTreeMap<String, Feature>,
}

impl ShardCache {
    fn new(info: DbShard, driver: Arc<dyn Driver>, page_size: u64) -> Self {
        ShardCache {
            info,
            driver,
            page_size: page_size.max(1),
            loaded: false,
            features: BTreeMap::new(),
        }
    }

    fn load(&mut self) -> Result<usize> {
        let mut features = BTreeMap::new();
        let mut page = 0;
        loop {
            let listing = self.driver.list_features(
                page,
                self.page_size,
                &self.info.db_id,
                Some(&self.info.shard_id),
            )?;
            for item in listing.data {
                features.insert(item.feature_id, item.feature);
            }
            page += 1;
            if page >= listing.total_page {
                break;
            }
        }

        self.features = features;
        self.loaded = true;
        info!(
            target: "vecshard::worker",
            shard_id = %self.info.shard_id,
            features = self.features.len(),
            "shard loaded"
        );
        Ok(self.features.len())
    }

    fn add(&mut self, items: Vec<FeatureDbItem>) -> Result<Vec<String>> {
        if self.info.is_closed {
            return Err(Error::ShardClosed {
                shard_id: self.info.shard_id.clone(),
            });
        }
        let expected = self.dimension().or_else(|| items.first().map(|i| i.feature.dimension()));
        for item in &items {
            if !item.feature.is_finite() {
                return Err(Error::Protocol(format!(
                    "shard {}: vector with NaN or infinite components",
                    self.info.shard_id
                )));
            }
            self.check_dimension(expected, item.feature.dimension())?;
        }
        let ids = self
            .driver
            .add_features(&items, &self.info.db_id, &self.info.shard_id)?;
        for (id, item) in ids.iter().zip(items) {
            self.features.insert(id.clone(), item.feature);
        }
        Ok(ids)
    }

    fn remove(&mut self, ids: Vec<String>) -> Result<usize> {
        let removed =
            self.driver
                .remove_features(&ids, &self.info.db_id, Some(&self.info.shard_id))?;
        for id in &ids {
            self.features.remove(id);
        }
        Ok(removed)
    }

    fn search(&self, query: &Feature, k: usize) -> Result<Vec<FeatureSearchItem>> {
        if !self.loaded {
            return Err(Error::Internal(format!(
                "shard {} searched before load",
                self.info.shard_id
            )));
        }

        self.check_dimension(self.dimension(), query.dimension())?;

        let mut rank = FeatureTopkRanking::new(query, k);
        for (feature_id, feature) in &self.features {
            rank.feed_in(feature_id, feature);
        }
        Ok(rank.sort_out())
    }

    /// Dimension of the cached vectors; `None` while the cache is empty.
    fn dimension(&self) -> Option<usize> {
        self.features.values().next().map(Feature::dimension)
    }

    fn check_dimension(&self, expected: Option<usize>, got: usize) -> Result<()> {
        match expected {
            Some(expected) if expected != got => Err(Error::Protocol(format!(
                "shard {}: dimension mismatch: expected {}, got {}",
                self.info.shard_id, expected, got
            ))),
            _ => Ok(()),
        }
    }

    fn snapshot(&self) -> DbShard {
        let mut info = self.info.clone();
        info.used = self.features.len() as u64;
        info
    }
}

impl Handler for ShardCache {
    type Request = ShardRequest;
    type Response = Result<ShardReply>;

    fn handle(&mut self, request: ShardRequest) -> Result<ShardReply> {
        match request {
            ShardRequest::Load => self.load().map(ShardReply::Loaded),
            ShardRequest::AddFeatures(items) => self.add(items).map(ShardReply::Added),
            ShardRequest::RemoveFeatures(ids) => self.remove(ids).map(ShardReply::Removed),
            ShardRequest::SearchFeature { query, k } => {
                self.search(&query, k).map(ShardReply::Hits)
            }
            ShardRequest::Close => {
                if self.info.is_closed {
                    warn!(target: "vecshard::worker", shard_id = %self.info.shard_id, "shard already closed, double close");
                }
                self.info.is_closed = true;
                Ok(ShardReply::Closed)
            }
            ShardRequest::Info => Ok(ShardReply::Info(self.snapshot())),
        }
    }
}

/// One shard served by a worker.
pub struct MemoryShard {
    db_id: String,
    shard_id: String,
    actor: Actor<ShardCache>,
}

impl MemoryShard {
    /// Create a stopped shard for `info`. Call [`start`](Self::start) and
    /// [`load`](Self::load) before use.
    pub fn new(
        info: DbShard,
        driver: Arc<dyn Driver>,
        page_size: u64,
        mailbox_capacity: usize,
    ) -> Self {
        let name = format!("vecshard-mshard-{}", short_id(&info.shard_id));
        MemoryShard {
            db_id: info.db_id.clone(),
            shard_id: info.shard_id.clone(),
            actor: Actor::new(name, mailbox_capacity, ShardCache::new(info, driver, page_size)),
        }
    }

    /// Owning database.
    pub fn db_id(&self) -> &str {
        &self.db_id
    }

    /// Shard id.
    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    /// Start the actor thread. Idempotent.
    pub fn start(&self) -> Result<()> {
        Ok(self.actor.start()?)
    }

    /// Stop the actor thread after queued requests finish. Idempotent.
    pub fn stop(&self) {
        self.actor.stop();
    }

    /// True while the actor thread is running.
    pub fn is_running(&self) -> bool {
        self.actor.is_running()
    }

    /// (Re)fill the cache from the driver. Returns the cached count.
    pub fn load(&self) -> Result<usize> {
        match self.actor.call(ShardRequest::Load)?? {
            ShardReply::Loaded(n) => Ok(n),
            other => Err(unexpected("Load", &other)),
        }
    }

    /// Persist then cache `items`; returns the new ids in input order.
    pub fn add_features(&self, items: Vec<FeatureDbItem>) -> Result<Vec<String>> {
        match self.actor.call(ShardRequest::AddFeatures(items))?? {
            ShardReply::Added(ids) => Ok(ids),
            other => Err(unexpected("AddFeatures", &other)),
        }
    }

    /// Delete `ids` from the driver and the cache; returns the removed count.
    pub fn remove_features(&self, ids: Vec<String>) -> Result<usize> {
        match self.actor.call(ShardRequest::RemoveFeatures(ids))?? {
            ShardReply::Removed(n) => Ok(n),
            other => Err(unexpected("RemoveFeatures", &other)),
        }
    }

    /// Best `k` cached features for `query`, best first.
    pub fn search_feature(&self, query: &Feature, k: usize) -> Result<Vec<FeatureSearchItem>> {
        let request = ShardRequest::SearchFeature {
            query: query.clone(),
            k,
        };
        match self.actor.call(request)?? {
            ShardReply::Hits(hits) => Ok(hits),
            other => Err(unexpected("SearchFeature", &other)),
        }
    }

    /// Reject further writes; reads keep working.
    pub fn close(&self) -> Result<()> {
        match self.actor.call(ShardRequest::Close)?? {
            ShardReply::Closed => Ok(()),
            other => Err(unexpected("Close", &other)),
        }
    }

    /// Shard record with `used` equal to the cached count.
    pub fn info(&self) -> Result<DbShard> {
        match self.actor.call(ShardRequest::Info)?? {
            ShardReply::Info(info) => Ok(info),
            other => Err(unexpected("Info", &other)),
        }
    }
}

fn unexpected(request: &str, reply: &ShardReply) -> Error {
    Error::Internal(format!("unexpected reply to {}: {:?}", request, reply))
}

/// Leading segment of an id, for thread names.
pub(crate) fn short_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}
