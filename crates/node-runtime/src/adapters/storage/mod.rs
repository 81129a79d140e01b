//! # Storage Backends
//!
//! Controller stores are `KvQbftStore` over a `KeyValueStore`: RocksDB with
//! the `rocksdb` feature, `InMemoryKvStore` otherwise.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

pub use qv_03_controller::InMemoryKvStore;
