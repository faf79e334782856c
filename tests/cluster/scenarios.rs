//! The reference scenarios: add and find, paging, cross-shard merge.

use crate::common::*;
use vecshard::{Error, FeatureDbItem, Metadata};

#[test]
fn add_two_vectors_and_find_the_first() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 10_000);
    let db_id = create_db(&coordinator, "faces");

    let vectors = random_features(7, 2, 512);
    let ids = coordinator.add_features(&db_id, vectors.clone()).unwrap();

    assert_eq!(ids.len(), 2);
    for id in &ids {
        assert!(uuid::Uuid::parse_str(id).is_ok(), "not a uuid: {}", id);
    }
    let shards = coordinator.list_shards(&db_id).unwrap();
    assert_eq!(shards.len(), 1);
    assert_eq!(shards[0].used, 2);
    assert_eq!(shards[0].worker_id, "w1");

    let hits = coordinator.search_feature(&db_id, &vectors[0], 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].feature_id, ids[0]);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert_eq!(hits[0].feature.raw, vectors[0].raw);
}

#[test]
fn list_features_pages_past_the_end() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 10_000);
    let db_id = create_db(&coordinator, "paged");

    coordinator
        .add_features(&db_id, random_features(1, 105, 8))
        .unwrap();

    let page = coordinator.list_features(&db_id, 10, 10).unwrap();
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.total_page, 11);
    assert_eq!(page.page, 10);

    let shard_id = coordinator.list_shards(&db_id).unwrap()[0].shard_id.clone();
    let page = coordinator
        .list_shard_features(&db_id, &shard_id, 10, 10)
        .unwrap();
    assert_eq!(page.data.len(), 5);
    assert_eq!(page.total_page, 11);

    let first = coordinator.list_features(&db_id, 0, 10).unwrap();
    assert_eq!(first.data.len(), 10);
    assert!(coordinator.list_features(&db_id, 11, 10).unwrap().data.is_empty());
    assert!(matches!(
        coordinator.list_shard_features(&db_id, "missing", 0, 10),
        Err(Error::ShardNotFound { .. })
    ));
}

#[test]
fn merged_top_k_matches_a_scan_over_every_shard() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    cluster.add_worker("w2", 1_000_000);
    let coordinator = cluster.coordinator(&["w1", "w2"], 51);
    let db_id = create_db(&coordinator, "merge");

    let first = random_features(11, 50, 16);
    let second = random_features(12, 50, 16);
    let first_ids = coordinator.add_features(&db_id, first.clone()).unwrap();
    let second_ids = coordinator.add_features(&db_id, second.clone()).unwrap();

    let shards = coordinator.list_shards(&db_id).unwrap();
    assert_eq!(shards.len(), 2);
    assert!(shards[0].is_closed);
    assert_ne!(shards[0].worker_id, shards[1].worker_id);

    let stored: Vec<_> = first_ids
        .into_iter()
        .zip(first)
        .chain(second_ids.into_iter().zip(second))
        .collect();
    for query in random_features(13, 5, 16) {
        let hits = coordinator.search_feature(&db_id, &query, 5).unwrap();
        let got: Vec<String> = hits.iter().map(|h| h.feature_id.clone()).collect();
        assert_eq!(got, brute_force_top_k(&query, &stored, 5));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[test]
fn k_larger_than_the_data_returns_everything() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 10_000);
    let db_id = create_db(&coordinator, "small");

    coordinator
        .add_features(&db_id, random_features(3, 4, 8))
        .unwrap();
    let hits = coordinator
        .search_feature(&db_id, &random_features(4, 1, 8)[0], 100)
        .unwrap();
    assert_eq!(hits.len(), 4);
}

#[test]
fn metadata_is_stored_with_the_feature() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 10_000);
    let db_id = create_db(&coordinator, "meta");

    let mut metadata = Metadata::new();
    metadata.insert("person".into(), "p-17".into());
    let ids = coordinator
        .add_feature_items(
            &db_id,
            vec![FeatureDbItem::with_metadata(feature(vec![0.3, 0.4]), metadata.clone())],
        )
        .unwrap();

    let page = coordinator.list_features(&db_id, 0, 10).unwrap();
    assert_eq!(page.data[0].feature_id, ids[0]);
    assert_eq!(page.data[0].metadata, metadata);
}

#[test]
fn a_batch_larger_than_a_shard_is_rejected() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 10);
    let db_id = create_db(&coordinator, "tiny");

    let err = coordinator
        .add_features(&db_id, random_features(5, 10, 4))
        .unwrap_err();
    assert!(matches!(err, Error::Capacity { .. }));
}
