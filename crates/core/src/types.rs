//! Entity types shared by the manager, the workers and the drivers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::feature::Feature;

/// Free-form string metadata attached to a stored feature.
pub type Metadata = BTreeMap<String, String>;

/// A logical database of features.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbItem {
    /// Globally unique id, assigned by the driver on creation
    pub db_id: String,
    /// Human-readable name
    pub name: String,
    /// Capacity budget in features
    pub capacity: u64,
    /// Features currently stored
    pub used: u64,
    /// Free text
    pub description: String,
}

impl DbItem {
    /// Describe a database to be created (the driver assigns the id).
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        DbItem {
            name: name.into(),
            capacity,
            ..Default::default()
        }
    }
}

/// A capacity-bounded partition of one database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbShard {
    /// Owning database
    pub db_id: String,
    /// Shard id, assigned by the driver on creation
    pub shard_id: String,
    /// Worker serving the shard; empty until assigned
    pub worker_id: String,
    /// Maximum number of features
    pub capacity: u64,
    /// Features currently stored
    pub used: u64,
    /// Closed shards never accept writes again
    pub is_closed: bool,
}

impl DbShard {
    /// A fresh, open, unassigned shard description.
    pub fn new(db_id: impl Into<String>, capacity: u64) -> Self {
        DbShard {
            db_id: db_id.into(),
            capacity,
            ..Default::default()
        }
    }

    /// Room left before the shard is full.
    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }

    /// True if the shard is open and strictly more than `count` slots remain.
    pub fn can_accept(&self, count: u64) -> bool {
        !self.is_closed && self.remaining() > count
    }

    /// True once a worker id has been recorded.
    pub fn has_worker(&self) -> bool {
        !self.worker_id.is_empty()
    }
}

/// A persisted worker record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerItem {
    /// Worker id reported by the worker itself
    pub worker_id: String,
    /// Address the manager connects to
    pub address: String,
    /// Capacity the worker advertises
    pub capacity: u64,
}

/// A stored feature with its id and metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureDbItem {
    /// Feature id; empty on input, assigned by the driver
    pub feature_id: String,
    /// The vector
    pub feature: Feature,
    /// Caller metadata
    pub metadata: Metadata,
}

impl FeatureDbItem {
    /// Wrap a feature for insertion, without metadata.
    pub fn new(feature: Feature) -> Self {
        FeatureDbItem {
            feature,
            ..Default::default()
        }
    }

    /// Wrap a feature for insertion, with metadata.
    pub fn with_metadata(feature: Feature, metadata: Metadata) -> Self {
        FeatureDbItem {
            feature,
            metadata,
            ..Default::default()
        }
    }
}

/// Collect the ids of a list of stored features.
pub fn feature_ids(items: &[FeatureDbItem]) -> Vec<String> {
    items.iter().map(|item| item.feature_id.clone()).collect()
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSearchItem {
    /// Id of the stored feature
    pub feature_id: String,
    /// The stored feature
    pub feature: Feature,
    /// Similarity to the query, higher = more similar
    pub score: f32,
}

impl FeatureSearchItem {
    /// Create a hit.
    pub fn new(feature_id: impl Into<String>, feature: Feature, score: f32) -> Self {
        FeatureSearchItem {
            feature_id: feature_id.into(),
            feature,
            score,
        }
    }
}

/// One page of a listing.
///
/// `page` is 0-based; `total_page = ceil(count / per_page)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageData<T> {
    /// Page index, 0-based
    pub page: u64,
    /// Requested page size
    pub per_page: u64,
    /// Number of pages for the whole listing
    pub total_page: u64,
    /// Items on this page
    pub data: T,
}

impl<T> PageData<T> {
    /// Number of pages needed to hold `count` items.
    pub fn total_pages(count: u64, per_page: u64) -> u64 {
        if per_page == 0 {
            return 0;
        }
        count.div_ceil(per_page)
    }
}
