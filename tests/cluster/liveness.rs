//! Workers that go away and come back.

use std::time::Duration;

use crate::common::*;
use vecshard::Error;

#[test]
fn dead_worker_is_skipped_by_placement_but_kept() {
    let mut cluster = TestCluster::in_memory();
    let w1 = cluster.add_worker("w1", 1_000_000);
    cluster.add_worker("w2", 1_000);
    let coordinator = cluster.coordinator(&["w1", "w2"], 10);
    let db_id = create_db(&coordinator, "live");

    coordinator
        .add_features(&db_id, random_features(41, 5, 8))
        .unwrap();
    assert_eq!(coordinator.list_shards(&db_id).unwrap()[0].worker_id, "w1");

    w1.set_reachable(false);
    let worker = coordinator.worker_manager().get_worker("w1").unwrap();
    assert!(wait_until(|| !worker.is_live()));

    let err = coordinator
        .search_feature(&db_id, &random_features(42, 1, 8)[0], 3)
        .unwrap_err();
    assert!(matches!(err, Error::WorkerUnreachable { .. }));
    assert!(err.is_retryable());

    // The open shard lacks room for six, so a new one is placed on w2.
    coordinator
        .add_features(&db_id, random_features(43, 6, 8))
        .unwrap();
    let shards = coordinator.list_shards(&db_id).unwrap();
    assert_eq!(shards.len(), 2);
    assert_eq!(shards[1].worker_id, "w2");
    assert_eq!(coordinator.worker_manager().list_workers().len(), 2);

    w1.set_reachable(true);
    assert!(wait_until(|| worker.is_live()));
    let hits = coordinator
        .search_feature(&db_id, &random_features(42, 1, 8)[0], 20)
        .unwrap();
    assert_eq!(hits.len(), 11);
}

#[test]
fn slow_worker_fails_its_health_check() {
    let mut cluster = TestCluster::in_memory();
    let w1 = cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 10);
    let worker = coordinator.worker_manager().get_worker("w1").unwrap();

    w1.set_delay(Duration::from_millis(500));
    assert!(wait_until(|| !worker.is_live()));
    w1.set_delay(Duration::ZERO);
    assert!(wait_until(|| worker.is_live()));
}

#[test]
fn no_live_worker_means_no_new_shard() {
    let mut cluster = TestCluster::in_memory();
    let w1 = cluster.add_worker("w1", 1_000_000);
    let coordinator = cluster.coordinator(&["w1"], 10);
    let db_id = create_db(&coordinator, "stalled");

    w1.set_reachable(false);
    let worker = coordinator.worker_manager().get_worker("w1").unwrap();
    assert!(wait_until(|| !worker.is_live()));

    let err = coordinator
        .add_features(&db_id, random_features(44, 1, 8))
        .unwrap_err();
    assert!(matches!(err, Error::NoWorkerAvailable));

    w1.set_reachable(true);
    assert!(wait_until(|| worker.is_live()));
    let ids = coordinator
        .add_features(&db_id, random_features(44, 1, 8))
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(coordinator.list_shards(&db_id).unwrap().len(), 1);
}

#[test]
fn unreachable_address_is_attached_once_it_answers() {
    let mut cluster = TestCluster::in_memory();
    let coordinator = cluster.coordinator(&["late"], 10);
    assert!(coordinator.worker_manager().list_workers().is_empty());
    assert_eq!(
        coordinator.worker_manager().pending_addresses(),
        vec![address("late")]
    );

    cluster.add_worker("late", 1_000);
    assert!(wait_until(|| coordinator
        .worker_manager()
        .get_worker("late")
        .is_ok()));

    let db_id = create_db(&coordinator, "after-probe");
    coordinator
        .add_features(&db_id, random_features(45, 2, 4))
        .unwrap();
    assert_eq!(coordinator.list_shards(&db_id).unwrap()[0].worker_id, "late");
    assert!(coordinator.worker_manager().pending_addresses().is_empty());
}
