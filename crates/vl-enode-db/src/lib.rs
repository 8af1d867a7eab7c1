//! # Validator Endpoint Database
//!
//! Durable state for the endpoint announcement protocol:
//!
//! - **Domain Layer:** table row types with their merge rules
//! - **Ports Layer:** the `KeyValueStore` abstraction the tables run over
//! - **Adapters Layer:** RocksDB (production) and in-memory (testing) stores
//! - **Tables:** `VersionTable` (signed announce versions) and
//!   `ValEnodeTable` (validator endpoints with query bookkeeping)
//!
//! Both tables are internally synchronized and mutate exclusively through a
//! single `upsert` entry point, each mutation one atomic batch write.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod tables;

pub use adapters::{DbConfig, InMemoryStore, RocksDbStore};
pub use domain::{
    AddressEntry, AddressEntryUpdate, QueryBookkeeping, SignedVersionEntry, StoreError,
};
pub use ports::{BatchOperation, KeyValueStore};
pub use tables::{ValEnodeTable, VersionTable};
