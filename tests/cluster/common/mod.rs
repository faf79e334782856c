//! Shared helpers for the cluster integration suite.
//!
//! A [`TestCluster`] runs brute-force workers in-process behind a
//! [`LocalConnector`], all sharing one driver, and builds coordinators over
//! them with fast liveness timings.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vecshard::{
    BruteForceWorker, Coordinator, DbItem, Driver, Feature, InProcessTransport, LocalConnector,
    LocalDriver, ManagerConfig, MemoryDriver, SearchWorker, WorkerConfig, WorkerConnector,
};

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. Set `RUST_LOG`-style
/// filtering with the subscriber defaults.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub const MODEL: &str = "test-model";

pub fn feature(raw: Vec<f32>) -> Feature {
    Feature::new(raw, MODEL, 1)
}

/// Deterministic random vectors in [-1, 1).
pub fn random_features(seed: u64, count: usize, dimension: usize) -> Vec<Feature> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| feature((0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect()))
        .collect()
}

pub fn address(worker_id: &str) -> String {
    format!("local://{}", worker_id)
}

/// Workers and a driver shared by every coordinator built from it.
pub struct TestCluster {
    pub driver: Arc<dyn Driver>,
    pub connector: Arc<LocalConnector>,
    pub workers: Vec<Arc<BruteForceWorker>>,
}

impl TestCluster {
    pub fn in_memory() -> Self {
        init_tracing();
        Self::with_driver(Arc::new(MemoryDriver::new()))
    }

    pub fn on_disk(path: &Path) -> Self {
        init_tracing();
        Self::with_driver(Arc::new(LocalDriver::open(path).expect("open local driver")))
    }

    pub fn with_driver(driver: Arc<dyn Driver>) -> Self {
        TestCluster {
            driver,
            connector: Arc::new(LocalConnector::new()),
            workers: Vec::new(),
        }
    }

    /// Start a worker reachable at `local://<worker_id>`.
    pub fn add_worker(&mut self, worker_id: &str, capacity: u64) -> Arc<InProcessTransport> {
        let config = WorkerConfig {
            worker_id: Some(worker_id.to_string()),
            capacity,
            ..WorkerConfig::default()
        };
        let worker = Arc::new(BruteForceWorker::new(config, Arc::clone(&self.driver)));
        self.workers.push(Arc::clone(&worker));
        self.connector
            .register(address(worker_id), worker as Arc<dyn SearchWorker>)
    }

    pub fn config(&self, worker_ids: &[&str], shard_capacity: u64) -> ManagerConfig {
        let mut config = ManagerConfig::new(worker_ids.iter().map(|id| address(id)).collect());
        config.shard_capacity = shard_capacity;
        config.liveness_interval_ms = 10;
        config.health_check_timeout_ms = 50;
        config.probe_interval_ms = 10;
        config
    }

    /// A started coordinator over `worker_ids`.
    pub fn coordinator(&self, worker_ids: &[&str], shard_capacity: u64) -> Coordinator {
        let coordinator = Coordinator::new(
            &self.config(worker_ids, shard_capacity),
            Arc::clone(&self.driver),
            Arc::clone(&self.connector) as Arc<dyn WorkerConnector>,
        );
        coordinator.start().expect("start coordinator");
        coordinator
    }
}

pub fn create_db(coordinator: &Coordinator, name: &str) -> String {
    coordinator
        .create_db(&DbItem::new(name, 1_000_000))
        .expect("create db")
}

/// Ids of the `k` best matches of `query`, by exhaustive scan.
pub fn brute_force_top_k(query: &Feature, stored: &[(String, Feature)], k: usize) -> Vec<String> {
    let mut scored: Vec<(f32, &String)> = stored
        .iter()
        .map(|(id, f)| (query.compare(f), id))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).expect("finite scores"));
    scored.into_iter().take(k).map(|(_, id)| id.clone()).collect()
}

/// Poll `cond` until it holds or five seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
