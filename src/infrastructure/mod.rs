//! Adapters behind the domain ports.

pub mod bakong;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
