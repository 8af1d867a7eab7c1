//! In-memory key-value store for tests and ephemeral nodes.

use std::collections::BTreeMap;

use crate::domain::StoreError;
use crate::ports::{BatchOperation, KeyValueStore};

/// Sorted in-memory store. Same interface as the persistent store, no
/// durability.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.map.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        // Nothing here can fail, so applying in order is trivially atomic.
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.map.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
