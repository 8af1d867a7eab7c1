//! Signed announce version table.
//!
//! Holds, per validator address, the highest announce version ever observed
//! with a valid signature. Rows arrive pre-verified; the table enforces
//! strict version growth and reports which rows actually advanced, since
//! those are the rows worth regossiping.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use shared_types::{Address, Version};
use tracing::trace;

use crate::domain::{SignedVersionEntry, StoreError};
use crate::ports::{BatchOperation, KeyValueStore};

const PREFIX: &[u8] = b"version:";

fn make_key(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX.len() + 20);
    key.extend_from_slice(PREFIX);
    key.extend_from_slice(address.as_bytes());
    key
}

/// Durable `address → signed announce version` table.
pub struct VersionTable {
    store: RwLock<Box<dyn KeyValueStore>>,
}

impl VersionTable {
    /// Wrap a backing store.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Insert every entry whose version strictly exceeds the stored one.
    /// Survivors are committed in one atomic batch and returned.
    pub fn upsert(
        &self,
        entries: Vec<SignedVersionEntry>,
    ) -> Result<Vec<SignedVersionEntry>, StoreError> {
        let mut store = self.store.write();

        let mut batch = Vec::new();
        let mut new_entries: Vec<SignedVersionEntry> = Vec::new();
        let mut accepted: HashMap<Address, Version> = HashMap::new();

        for entry in entries {
            let stored_version = match accepted.get(&entry.address) {
                // A same-call entry for this address already won; compare
                // against it, not the store.
                Some(version) => Some(*version),
                None => self
                    .read_entry(store.as_ref(), &entry.address)?
                    .map(|e| e.version),
            };

            if let Some(current) = stored_version {
                if entry.version <= current {
                    trace!(address = %entry.address, version = entry.version, current, "version not newer, skipping");
                    continue;
                }
            }

            accepted.insert(entry.address, entry.version);
            batch.push(BatchOperation::put(make_key(&entry.address), entry.to_bytes()));
            // Same-address duplicates within one call: last write wins, keep
            // only the winning row in the returned set.
            new_entries.retain(|e| e.address != entry.address);
            new_entries.push(entry);
        }

        if !batch.is_empty() {
            store.atomic_batch_write(batch)?;
        }
        Ok(new_entries)
    }

    /// Fetch one row.
    pub fn get(&self, address: &Address) -> Result<Option<SignedVersionEntry>, StoreError> {
        let store = self.store.read();
        self.read_entry(store.as_ref(), address)
    }

    /// Dump the whole table, for the periodic share.
    pub fn get_all(&self) -> Result<Vec<SignedVersionEntry>, StoreError> {
        let store = self.store.read();
        store
            .prefix_scan(PREFIX)?
            .iter()
            .map(|(_, value)| SignedVersionEntry::from_bytes(value))
            .collect()
    }

    /// Remove every row whose address is not in `active`. Returns the number
    /// of rows removed.
    pub fn prune(&self, active: &HashSet<Address>) -> Result<usize, StoreError> {
        let mut store = self.store.write();

        let mut batch = Vec::new();
        for (key, value) in store.prefix_scan(PREFIX)? {
            let entry = SignedVersionEntry::from_bytes(&value)?;
            if !active.contains(&entry.address) {
                batch.push(BatchOperation::delete(key));
            }
        }

        let removed = batch.len();
        if removed > 0 {
            store.atomic_batch_write(batch)?;
        }
        Ok(removed)
    }

    fn read_entry(
        &self,
        store: &dyn KeyValueStore,
        address: &Address,
    ) -> Result<Option<SignedVersionEntry>, StoreError> {
        store
            .get(&make_key(address))?
            .map(|bytes| SignedVersionEntry::from_bytes(&bytes))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use shared_crypto::{keccak256, Keypair};

    fn table() -> VersionTable {
        VersionTable::new(Box::new(InMemoryStore::new()))
    }

    fn entry(keypair: &Keypair, version: Version) -> SignedVersionEntry {
        let sig = keypair.sign_digest(&keccak256(&version.to_be_bytes())).unwrap();
        SignedVersionEntry::new(keypair.public_key(), version, sig)
    }

    #[test]
    fn test_upsert_returns_only_advancing_rows() {
        let table = table();
        let keypair = Keypair::generate();

        let new = table.upsert(vec![entry(&keypair, 100)]).unwrap();
        assert_eq!(new.len(), 1);

        // Same version again: no change.
        let new = table.upsert(vec![entry(&keypair, 100)]).unwrap();
        assert!(new.is_empty());

        // Regression: rejected.
        let new = table.upsert(vec![entry(&keypair, 99)]).unwrap();
        assert!(new.is_empty());
        assert_eq!(table.get(&keypair.address()).unwrap().unwrap().version, 100);

        // Advance: accepted.
        let new = table.upsert(vec![entry(&keypair, 101)]).unwrap();
        assert_eq!(new.len(), 1);
    }

    #[test]
    fn test_upsert_same_address_twice_in_one_call() {
        let table = table();
        let keypair = Keypair::generate();

        let new = table
            .upsert(vec![entry(&keypair, 5), entry(&keypair, 7), entry(&keypair, 6)])
            .unwrap();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].version, 7);
        assert_eq!(table.get(&keypair.address()).unwrap().unwrap().version, 7);
    }

    #[test]
    fn test_get_all_dumps_every_row() {
        let table = table();
        let a = Keypair::generate();
        let b = Keypair::generate();

        table.upsert(vec![entry(&a, 1), entry(&b, 2)]).unwrap();
        let all = table.get_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_prune_removes_departed_validators() {
        let table = table();
        let stays = Keypair::generate();
        let leaves = Keypair::generate();

        table.upsert(vec![entry(&stays, 1), entry(&leaves, 1)]).unwrap();

        let active: HashSet<Address> = [stays.address()].into_iter().collect();
        let removed = table.prune(&active).unwrap();
        assert_eq!(removed, 1);

        assert!(table.get(&stays.address()).unwrap().is_some());
        assert!(table.get(&leaves.address()).unwrap().is_none());
    }

    #[test]
    fn test_version_is_monotonic_over_time() {
        let table = table();
        let keypair = Keypair::generate();

        let mut last = 0;
        for version in [10, 3, 20, 19, 21] {
            table.upsert(vec![entry(&keypair, version)]).unwrap();
            let stored = table.get(&keypair.address()).unwrap().unwrap().version;
            assert!(stored >= last);
            last = stored;
        }
        assert_eq!(last, 21);
    }
}
