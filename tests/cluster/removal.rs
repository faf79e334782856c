//! Removing features end-to-end.

use crate::common::*;
use vecshard::Error;

#[test]
fn removed_features_stop_matching() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    cluster.add_worker("w2", 1_000_000);
    let coordinator = cluster.coordinator(&["w1", "w2"], 4);
    let db_id = create_db(&coordinator, "removal");

    let vectors = random_features(51, 9, 8);
    let mut ids = Vec::new();
    for v in &vectors {
        ids.extend(coordinator.add_features(&db_id, vec![v.clone()]).unwrap());
    }
    assert_eq!(coordinator.list_shards(&db_id).unwrap().len(), 3);

    let doomed: Vec<String> = ids.iter().step_by(2).cloned().collect();
    assert_eq!(coordinator.remove_features(&db_id, &doomed).unwrap(), 5);
    assert_eq!(coordinator.remove_features(&db_id, &doomed).unwrap(), 0);

    let shards = coordinator.list_shards(&db_id).unwrap();
    assert_eq!(shards.iter().map(|s| s.used).sum::<u64>(), 4);
    let page = coordinator.list_features(&db_id, 0, 100).unwrap();
    assert_eq!(page.data.len(), 4);

    for (id, vector) in ids.iter().zip(&vectors) {
        let hits = coordinator.search_feature(&db_id, vector, 9).unwrap();
        let found = hits.iter().any(|h| &h.feature_id == id);
        assert_eq!(found, !doomed.contains(id));
    }
}

#[test]
fn removal_reaches_closed_shards() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 4);
    let db_id = create_db(&coordinator, "closed");

    let first = coordinator
        .add_features(&db_id, random_features(52, 3, 4))
        .unwrap();
    coordinator
        .add_features(&db_id, random_features(53, 3, 4))
        .unwrap();
    let shards = coordinator.list_shards(&db_id).unwrap();
    assert!(shards[0].is_closed);

    assert_eq!(coordinator.remove_features(&db_id, &first[..2]).unwrap(), 2);
    assert_eq!(coordinator.list_shards(&db_id).unwrap()[0].used, 1);
}

#[test]
fn removal_from_an_unknown_db_fails() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000);
    let coordinator = cluster.coordinator(&["w1"], 4);
    assert!(matches!(
        coordinator.remove_features("missing", &["x".to_string()]),
        Err(Error::DbNotFound { .. })
    ));
}
