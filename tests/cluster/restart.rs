//! Restarting the manager and the workers over a persistent driver.

use crate::common::*;
use tempfile::TempDir;

#[test]
fn state_survives_a_full_restart_on_disk() {
    let dir = TempDir::new().unwrap();
    let vectors = random_features(21, 12, 32);

    let (db_id, ids) = {
        let mut cluster = TestCluster::on_disk(dir.path());
        cluster.add_worker("w1", 1_000_000);
        let coordinator = cluster.coordinator(&["w1"], 8);
        let db_id = create_db(&coordinator, "persisted");
        let mut ids = coordinator
            .add_features(&db_id, vectors[..6].to_vec())
            .unwrap();
        ids.extend(coordinator.add_features(&db_id, vectors[6..].to_vec()).unwrap());
        coordinator.stop();
        (db_id, ids)
    };

    // Fresh processes: nothing cached, the worker address comes from the
    // persisted worker record.
    let mut cluster = TestCluster::on_disk(dir.path());
    cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&[], 8);

    let db = coordinator.find_db(&db_id).unwrap();
    assert_eq!(db.name, "persisted");
    let shards = coordinator.list_shards(&db_id).unwrap();
    assert_eq!(shards.len(), 2);
    assert!(shards[0].is_closed);
    assert!(!shards[1].is_closed);
    assert!(shards.iter().all(|s| s.worker_id == "w1"));
    assert_eq!(shards.iter().map(|s| s.used).sum::<u64>(), 12);

    for (id, vector) in ids.iter().zip(&vectors) {
        let hits = coordinator.search_feature(&db_id, vector, 1).unwrap();
        assert_eq!(&hits[0].feature_id, id);
    }

    let more = coordinator
        .add_features(&db_id, random_features(22, 1, 32))
        .unwrap();
    assert_eq!(more.len(), 1);
    assert_eq!(coordinator.list_shards(&db_id).unwrap()[1].used, 7);
}

#[test]
fn shards_of_a_missing_worker_move_to_placement() {
    let dir = TempDir::new().unwrap();
    let db_id = {
        let mut cluster = TestCluster::on_disk(dir.path());
        cluster.add_worker("old", 1_000_000);
        let coordinator = cluster.coordinator(&["old"], 100);
        let db_id = create_db(&coordinator, "moved");
        coordinator
            .add_features(&db_id, random_features(31, 3, 4))
            .unwrap();
        db_id
    };

    let mut cluster = TestCluster::on_disk(dir.path());
    cluster.add_worker("new", 1_000_000);
    let coordinator = cluster.coordinator(&["new"], 100);

    let shards = coordinator.list_shards(&db_id).unwrap();
    assert_eq!(shards[0].worker_id, "new");
    let hits = coordinator
        .search_feature(&db_id, &random_features(31, 1, 4)[0], 10)
        .unwrap();
    assert_eq!(hits.len(), 3);
}
