//! Default sizes and intervals
//!
//! Every value here can be overridden through the manager or worker config;
//! these are the values used when a config leaves the key out.

use std::time::Duration;

/// Capacity given to a newly created shard, in features (1 GiB-equivalent budget).
pub const DEFAULT_SHARD_CAPACITY: u64 = 1024 * 1024 * 1024;

/// Capacity a worker advertises when its config does not set one.
///
/// Placement reserves a shard's full capacity on its worker, so this must
/// hold many `DEFAULT_SHARD_CAPACITY` shards.
pub const DEFAULT_WORKER_CAPACITY: u64 = 64 * DEFAULT_SHARD_CAPACITY;

/// Each shard is asked for `k * SEARCH_OVERFETCH_FACTOR` results before the
/// coordinator merges down to `k`.
pub const SEARCH_OVERFETCH_FACTOR: usize = 2;

/// Page size used when a worker-side shard loads its features from the driver.
pub const DEFAULT_LOAD_PAGE_SIZE: u64 = 10;

/// Bound of every actor mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Pause between two liveness checks of the same worker.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline of a single health-check call.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between two connection attempts to a worker address that was
/// unreachable at startup.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);
