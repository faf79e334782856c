//! Core types for vecshard
//!
//! This crate defines the foundational types used throughout the system:
//! - Feature: embedding vector, cosine comparison, wire blob codec
//! - FeatureTopkRanking: bounded top-k accumulator shared by every search level
//! - DbItem / DbShard / WorkerItem / FeatureDbItem: persisted entities
//! - Error: error type hierarchy
//! - limits: default capacities, page sizes and intervals

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod feature;
pub mod limits;
pub mod ranking;
pub mod types;

pub use error::{Error, Result};
pub use feature::Feature;
pub use ranking::FeatureTopkRanking;
pub use types::{
    feature_ids, DbItem, DbShard, FeatureDbItem, FeatureSearchItem, Metadata, PageData,
    WorkerItem,
};
