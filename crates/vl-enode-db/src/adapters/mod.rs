//! Adapters layer: concrete `KeyValueStore` implementations.

pub mod memory;
pub mod rocksdb_store;

pub use memory::InMemoryStore;
pub use rocksdb_store::{DbConfig, RocksDbStore};
