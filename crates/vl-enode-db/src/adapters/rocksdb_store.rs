//! # RocksDB Storage Adapter
//!
//! Persistent implementation of the `KeyValueStore` port.
//!
//! ## Features
//!
//! - Atomic batch writes (WriteBatch)
//! - Prefix iteration over sorted keys
//! - Schema versioning: a reserved `dbVersion` key is checked on open; a
//!   mismatch wipes and rebuilds the store
//! - Corruption recovery via `DB::repair` followed by re-validation

use std::path::PathBuf;

use rocksdb::{Direction, ErrorKind, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use tracing::info;

use crate::domain::StoreError;
use crate::ports::{BatchOperation, KeyValueStore};

/// Reserved key holding the schema version. Lives outside every table prefix.
const DB_VERSION_KEY: &[u8] = b"dbVersion";

/// Current schema version, bumped on any breaking row-format change.
const DB_VERSION: i64 = 1;

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the database directory.
    pub path: PathBuf,
    /// Open file handle cap for the store.
    pub max_open_files: i32,
    /// Enable fsync after each write.
    pub sync_writes: bool,
}

impl DbConfig {
    /// Config for a store at `path` with production defaults.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_open_files: 64,
            sync_writes: true,
        }
    }

    /// Config for testing: no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_open_files: 64,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key-value store.
pub struct RocksDbStore {
    db: DB,
    sync_writes: bool,
}

impl RocksDbStore {
    /// Open or create the store, recovering from corruption and flushing the
    /// contents on a schema version mismatch.
    pub fn open(config: DbConfig) -> Result<Self, StoreError> {
        let db = match Self::open_raw(&config) {
            Ok(db) => db,
            Err(e) if e.kind() == ErrorKind::Corruption => {
                info!(path = %config.path.display(), "store corrupted, running repair");
                DB::repair(&Self::options(&config), &config.path)?;
                Self::open_raw(&config)?
            }
            Err(e) => return Err(e.into()),
        };

        let current = encode_varint(DB_VERSION);
        match db.get(DB_VERSION_KEY)? {
            None => {
                // Empty store, stamp it.
                db.put(DB_VERSION_KEY, &current)?;
            }
            Some(blob) if blob == current => {}
            Some(blob) => {
                let old = decode_varint(&blob);
                info!(
                    old_version = ?old,
                    new_version = DB_VERSION,
                    path = %config.path.display(),
                    "store schema changed, rebuilding"
                );
                drop(db);
                DB::destroy(&Self::options(&config), &config.path)?;
                let db = Self::open_raw(&config)?;
                db.put(DB_VERSION_KEY, &current)?;
                return Ok(Self {
                    db,
                    sync_writes: config.sync_writes,
                });
            }
        }

        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }

    fn options(config: &DbConfig) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(config.max_open_files);
        opts
    }

    fn open_raw(config: &DbConfig) -> Result<DB, rocksdb::Error> {
        DB::open(&Self::options(config), &config.path)
    }

    fn write_opts(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        Ok(self.db.put_opt(key, value, &self.write_opts())?)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        Ok(self.db.delete_opt(key, &self.write_opts())?)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        Ok(self.db.write_opt(batch, &self.write_opts())?)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut results = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

/// Zigzag varint encoding of a signed integer, minimal length.
fn encode_varint(value: i64) -> Vec<u8> {
    let mut v = ((value << 1) ^ (value >> 63)) as u64;
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out
}

/// Decode a zigzag varint; `None` on truncation or overflow.
fn decode_varint(bytes: &[u8]) -> Option<i64> {
    let mut v: u64 = 0;
    let mut shift = 0u32;
    for &byte in bytes {
        if shift >= 64 {
            return None;
        }
        v |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            let decoded = ((v >> 1) as i64) ^ -((v & 1) as i64);
            return Some(decoded);
        }
        shift += 7;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_put_get() {
        let dir = TempDir::new().unwrap();
        let mut store = RocksDbStore::open(DbConfig::for_testing(dir.path())).unwrap();

        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_version_stamp_written_on_first_open() {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(DbConfig::for_testing(dir.path())).unwrap();
        assert_eq!(
            store.get(DB_VERSION_KEY).unwrap(),
            Some(encode_varint(DB_VERSION))
        );
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = RocksDbStore::open(DbConfig::for_testing(dir.path())).unwrap();
            store.put(b"persisted", b"yes").unwrap();
        }
        let store = RocksDbStore::open(DbConfig::for_testing(dir.path())).unwrap();
        assert_eq!(store.get(b"persisted").unwrap(), Some(b"yes".to_vec()));
    }

    #[test]
    fn test_schema_mismatch_wipes_store() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = RocksDbStore::open(DbConfig::for_testing(dir.path())).unwrap();
            store.put(b"doomed", b"data").unwrap();
            // Simulate a store written by an older schema.
            store.put(DB_VERSION_KEY, &encode_varint(DB_VERSION - 1)).unwrap();
        }
        let store = RocksDbStore::open(DbConfig::for_testing(dir.path())).unwrap();
        assert_eq!(store.get(b"doomed").unwrap(), None);
        assert_eq!(
            store.get(DB_VERSION_KEY).unwrap(),
            Some(encode_varint(DB_VERSION))
        );
    }

    #[test]
    fn test_atomic_batch_and_prefix_scan() {
        let dir = TempDir::new().unwrap();
        let mut store = RocksDbStore::open(DbConfig::for_testing(dir.path())).unwrap();

        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"t:a".to_vec(), b"1".to_vec()),
                BatchOperation::put(b"t:b".to_vec(), b"2".to_vec()),
                BatchOperation::put(b"u:c".to_vec(), b"3".to_vec()),
            ])
            .unwrap();

        let rows = store.prefix_scan(b"t:").unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_varint_round_trip() {
        for v in [0i64, 1, -1, 5, 63, 64, -64, i64::MAX, i64::MIN] {
            assert_eq!(decode_varint(&encode_varint(v)), Some(v), "value {v}");
        }
        assert_eq!(decode_varint(&[]), None);
        assert_eq!(decode_varint(&[0x80]), None);
    }
}
