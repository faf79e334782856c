//! Persistence for vecshard
//!
//! - Driver: the persistence trait used by the manager and the workers
//! - MemoryDriver: in-process maps
//! - LocalDriver: JSON catalog snapshot and journal plus one MessagePack file per feature
//! - DriverConfig / open_driver: pick a driver from configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

mod catalog;
pub mod config;
pub mod driver;
mod journal;
pub mod local;
pub mod memory;

pub use config::{open_driver, DriverConfig};
pub use driver::Driver;
pub use local::LocalDriver;
pub use memory::MemoryDriver;
