//! Bounded top-k accumulator
//!
//! [`FeatureTopkRanking`] is the single place where "best k" is decided. It is
//! used to scan one shard's features, to merge the shards a worker serves,
//! and to merge the per-shard answers on the coordinator, so ordering and
//! tie-breaking are identical at every level.
//!
//! The accumulator keeps a min-heap of at most `k` entries. Until the heap is
//! full every item is kept; after that an item replaces the current minimum
//! only if its score is strictly greater. Among equal scores the item fed
//! first ranks first. NaN scores are never kept.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::feature::Feature;
use crate::types::FeatureSearchItem;

/// Heap entry: score plus feed sequence for deterministic ties.
#[derive(Debug)]
struct Ranked {
    score: f32,
    seq: u64,
    item: FeatureSearchItem,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher score = Greater. Tie-break: earlier feed = Greater, so the
        // min-heap evicts the most recently fed of equal scores first.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Keeps the `k` items most similar to a query.
///
/// Single use: [`sort_out`](Self::sort_out) drains the accumulator.
pub struct FeatureTopkRanking<'q> {
    query: &'q Feature,
    k: usize,
    fed: u64,
    /// BinaryHeap<Reverse<_>> = min-heap (pops lowest score first)
    heap: BinaryHeap<Reverse<Ranked>>,
}

impl<'q> FeatureTopkRanking<'q> {
    /// Create an accumulator for the `k` best matches of `query`.
    pub fn new(query: &'q Feature, k: usize) -> Self {
        FeatureTopkRanking {
            query,
            k,
            fed: 0,
            heap: BinaryHeap::with_capacity(k.min(4096)),
        }
    }

    /// The query this accumulator scores against.
    pub fn query(&self) -> &Feature {
        self.query
    }

    /// Number of items currently held (≤ k).
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if nothing has been kept.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Score a stored feature against the query and offer it.
    ///
    /// The feature is only cloned if it is kept.
    pub fn feed_in(&mut self, feature_id: &str, feature: &Feature) {
        let score = feature.compare(self.query);
        if !self.admits(score) {
            self.fed += 1;
            return;
        }
        self.push(FeatureSearchItem::new(feature_id, feature.clone(), score));
    }

    /// Offer an item that already carries its score (merge path).
    pub fn feed_scored(&mut self, item: FeatureSearchItem) {
        if !self.admits(item.score) {
            self.fed += 1;
            return;
        }
        self.push(item);
    }

    /// Offer every scored item of a list, in order.
    pub fn feed_all(&mut self, items: impl IntoIterator<Item = FeatureSearchItem>) {
        for item in items {
            self.feed_scored(item);
        }
    }

    /// Drain the accumulator, best first.
    pub fn sort_out(&mut self) -> Vec<FeatureSearchItem> {
        // Ascending Reverse<Ranked> == descending Ranked
        std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(ranked)| ranked.item)
            .collect()
    }

    fn admits(&self, score: f32) -> bool {
        if self.k == 0 || score.is_nan() {
            return false;
        }
        if self.heap.len() < self.k {
            return true;
        }
        match self.heap.peek() {
            Some(Reverse(min)) => score > min.score,
            None => true,
        }
    }

    fn push(&mut self, item: FeatureSearchItem) {
        let seq = self.fed;
        self.fed += 1;
        if self.heap.len() >= self.k {
            self.heap.pop();
        }
        self.heap.push(Reverse(Ranked {
            score: item.score,
            seq,
            item,
        }));
    }
}
