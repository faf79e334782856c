//! Many writers and readers on one database.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use crate::common::*;

#[test]
fn concurrent_writers_never_overfill_a_shard() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    cluster.add_worker("w2", 1_000_000);
    let coordinator = Arc::new(cluster.coordinator(&["w1", "w2"], 50));
    let db_id = create_db(&coordinator, "busy");

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let coordinator = Arc::clone(&coordinator);
            let db_id = db_id.clone();
            thread::spawn(move || {
                let mut ids = Vec::new();
                for f in random_features(100 + t, 25, 8) {
                    ids.extend(coordinator.add_features(&db_id, vec![f]).unwrap());
                }
                ids
            })
        })
        .collect();

    let mut all = BTreeSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all.insert(id));
        }
    }
    assert_eq!(all.len(), 200);

    let shards = coordinator.list_shards(&db_id).unwrap();
    assert!(shards.iter().all(|s| s.used <= s.capacity));
    assert_eq!(shards.iter().map(|s| s.used).sum::<u64>(), 200);
    assert_eq!(shards.iter().filter(|s| !s.is_closed).count(), 1);
    assert_eq!(coordinator.list_features(&db_id, 0, 1000).unwrap().data.len(), 200);
}

#[test]
fn searches_run_alongside_writes() {
    let mut cluster = TestCluster::in_memory();
    cluster.add_worker("w1", 1_000_000);
    let coordinator = Arc::new(cluster.coordinator(&["w1"], 20));
    let db_id = create_db(&coordinator, "mixed");
    coordinator
        .add_features(&db_id, random_features(60, 10, 8))
        .unwrap();

    let writer = {
        let coordinator = Arc::clone(&coordinator);
        let db_id = db_id.clone();
        thread::spawn(move || {
            for f in random_features(61, 60, 8) {
                coordinator.add_features(&db_id, vec![f]).unwrap();
            }
        })
    };
    let queries = random_features(62, 50, 8);
    for query in &queries {
        let hits = coordinator.search_feature(&db_id, query, 5).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
    writer.join().unwrap();

    let used: u64 = coordinator
        .list_shards(&db_id)
        .unwrap()
        .iter()
        .map(|s| s.used)
        .sum();
    assert_eq!(used, 70);
}
