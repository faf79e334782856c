//! End-to-end tests: coordinator, shard actors and in-process workers.

mod common;

mod concurrency;
mod liveness;
mod removal;
mod restart;
mod scenarios;
