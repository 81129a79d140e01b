//! Adapters (hexagonal architecture)

pub mod kv_store;
pub mod qbft_store;

pub use kv_store::InMemoryKvStore;
pub use qbft_store::KvQbftStore;
