//! Validator endpoint (val-enode) table.
//!
//! One row per validator: the endpoint we hold, the highest version we have
//! heard announced, and the bookkeeping that throttles our queries for it.
//! All mutation flows through [`ValEnodeTable::upsert`], which merges field
//! by field under the monotonicity rules of [`AddressEntry::apply`].

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use shared_types::{Address, Node, Version};
use tracing::trace;

use crate::domain::{AddressEntry, AddressEntryUpdate, StoreError};
use crate::ports::{BatchOperation, KeyValueStore};

const PREFIX: &[u8] = b"valenode:";

fn make_key(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX.len() + 20);
    key.extend_from_slice(PREFIX);
    key.extend_from_slice(address.as_bytes());
    key
}

fn address_from_key(key: &[u8]) -> Result<Address, StoreError> {
    key.strip_prefix(PREFIX)
        .and_then(Address::from_slice)
        .ok_or_else(|| StoreError::Corrupt("bad val-enode key".into()))
}

/// Durable `address → endpoint entry` table.
pub struct ValEnodeTable {
    store: RwLock<Box<dyn KeyValueStore>>,
}

impl ValEnodeTable {
    /// Wrap a backing store.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    /// Merge a batch of updates. Rows are created on first sight of an
    /// address; unchanged rows are not rewritten. The whole batch commits as
    /// one atomic write.
    pub fn upsert(&self, updates: Vec<AddressEntryUpdate>) -> Result<(), StoreError> {
        let mut store = self.store.write();

        // Same-address updates within a call must see each other, so merge
        // into a working set before writing.
        let mut working: HashMap<Address, (AddressEntry, bool)> = HashMap::new();

        for update in updates {
            let (entry, changed) = match working.remove(&update.address) {
                Some(pair) => pair,
                None => {
                    let existing = self.read_entry(store.as_ref(), &update.address)?;
                    (
                        existing.unwrap_or_else(|| AddressEntry::empty(update.address)),
                        false,
                    )
                }
            };
            let mut entry = entry;
            let applied = entry.apply(&update);
            if applied {
                trace!(address = %update.address, version = entry.version, highest = entry.highest_known_version, "val-enode entry updated");
            }
            working.insert(update.address, (entry, changed || applied));
        }

        let batch: Vec<BatchOperation> = working
            .values()
            .filter(|(_, changed)| *changed)
            .map(|(entry, _)| BatchOperation::put(make_key(&entry.address), entry.to_bytes()))
            .collect();

        if !batch.is_empty() {
            store.atomic_batch_write(batch)?;
        }
        Ok(())
    }

    /// Fetch one row.
    pub fn get(&self, address: &Address) -> Result<Option<AddressEntry>, StoreError> {
        let store = self.store.read();
        self.read_entry(store.as_ref(), address)
    }

    /// The endpoint held for `address`, if one was ever delivered.
    pub fn get_node(&self, address: &Address) -> Result<Option<Node>, StoreError> {
        Ok(self.get(address)?.and_then(|e| e.node))
    }

    /// The endpoint version held for `address`.
    pub fn get_version(&self, address: &Address) -> Result<Option<Version>, StoreError> {
        Ok(self.get(address)?.map(|e| e.version))
    }

    /// Dump the whole table keyed by address.
    pub fn get_all(&self) -> Result<HashMap<Address, AddressEntry>, StoreError> {
        let store = self.store.read();
        let mut all = HashMap::new();
        for (key, value) in store.prefix_scan(PREFIX)? {
            let address = address_from_key(&key)?;
            all.insert(address, AddressEntry::from_bytes(address, &value)?);
        }
        Ok(all)
    }

    /// Remove every row whose address is not in `active`. Returns the number
    /// of rows removed.
    pub fn prune_entries(&self, active: &HashSet<Address>) -> Result<usize, StoreError> {
        let mut store = self.store.write();

        let mut batch = Vec::new();
        for (key, _) in store.prefix_scan(PREFIX)? {
            if !active.contains(&address_from_key(&key)?) {
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
    ) -> Result<Option<AddressEntry>, StoreError> {
        store
            .get(&make_key(address))?
            .map(|bytes| AddressEntry::from_bytes(*address, &bytes))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::QueryBookkeeping;
    use shared_crypto::Keypair;
    use shared_types::Timestamp;

    fn table() -> ValEnodeTable {
        ValEnodeTable::new(Box::new(InMemoryStore::new()))
    }

    fn node(port: u16) -> Node {
        format!("enode://{}@127.0.0.1:{}", "cd".repeat(64), port)
            .parse()
            .unwrap()
    }

    #[test]
    fn test_upsert_creates_then_merges() {
        let table = table();
        let keypair = Keypair::generate();
        let addr = Address::new([1; 20]);

        table
            .upsert(vec![AddressEntryUpdate::version_hint(
                addr,
                keypair.public_key(),
                50,
            )])
            .unwrap();

        let entry = table.get(&addr).unwrap().unwrap();
        assert!(entry.is_stale());
        assert_eq!(entry.highest_known_version, 50);
        assert!(entry.node.is_none());

        table
            .upsert(vec![AddressEntryUpdate::endpoint(addr, node(30303), 50)])
            .unwrap();
        let entry = table.get(&addr).unwrap().unwrap();
        assert!(!entry.is_stale());
        assert_eq!(entry.version, 50);
        assert_eq!(table.get_node(&addr).unwrap(), Some(node(30303)));
        assert_eq!(table.get_version(&addr).unwrap(), Some(50));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let table = table();
        let addr = Address::new([2; 20]);
        let update = AddressEntryUpdate::endpoint(addr, node(1), 7);

        table.upsert(vec![update.clone()]).unwrap();
        let first = table.get(&addr).unwrap().unwrap();

        table.upsert(vec![update]).unwrap();
        let second = table.get(&addr).unwrap().unwrap();

        assert_eq!(first.version, second.version);
        assert_eq!(first.node, second.node);
        assert_eq!(first.num_query_attempts, second.num_query_attempts);
    }

    #[test]
    fn test_bookkeeping_survives_until_version_advances() {
        let table = table();
        let addr = Address::new([3; 20]);

        table
            .upsert(vec![AddressEntryUpdate::endpoint(addr, node(1), 10)])
            .unwrap();
        table
            .upsert(vec![AddressEntryUpdate::bookkeeping(
                addr,
                QueryBookkeeping {
                    for_version: 10,
                    num_attempts: 2,
                    last_query_timestamp: Timestamp::new(500),
                },
            )])
            .unwrap();
        assert_eq!(table.get(&addr).unwrap().unwrap().num_query_attempts, 2);

        // Version advances: bookkeeping resets.
        table
            .upsert(vec![AddressEntryUpdate::endpoint(addr, node(2), 11)])
            .unwrap();
        let entry = table.get(&addr).unwrap().unwrap();
        assert_eq!(entry.num_query_attempts, 0);
        assert!(entry.last_query_timestamp.is_none());
    }

    #[test]
    fn test_same_address_updates_in_one_call_compose() {
        let table = table();
        let keypair = Keypair::generate();
        let addr = Address::new([4; 20]);

        table
            .upsert(vec![
                AddressEntryUpdate::version_hint(addr, keypair.public_key(), 9),
                AddressEntryUpdate::endpoint(addr, node(5), 9),
            ])
            .unwrap();

        let entry = table.get(&addr).unwrap().unwrap();
        assert_eq!(entry.version, 9);
        assert_eq!(entry.highest_known_version, 9);
        assert!(entry.public_key.is_some());
    }

    #[test]
    fn test_prune_entries() {
        let table = table();
        let keep = Address::new([5; 20]);
        let drop = Address::new([6; 20]);

        table
            .upsert(vec![
                AddressEntryUpdate::endpoint(keep, node(1), 1),
                AddressEntryUpdate::endpoint(drop, node(2), 1),
            ])
            .unwrap();

        let active: HashSet<Address> = [keep].into_iter().collect();
        assert_eq!(table.prune_entries(&active).unwrap(), 1);
        assert!(table.get(&keep).unwrap().is_some());
        assert!(table.get(&drop).unwrap().is_none());

        let all = table.get_all().unwrap();
        assert!(all.keys().all(|a| active.contains(a)));
    }

    #[test]
    fn test_version_never_exceeds_highest_known() {
        let table = table();
        let keypair = Keypair::generate();
        let addr = Address::new([7; 20]);

        table
            .upsert(vec![AddressEntryUpdate::endpoint(addr, node(1), 30)])
            .unwrap();
        table
            .upsert(vec![AddressEntryUpdate::version_hint(
                addr,
                keypair.public_key(),
                25,
            )])
            .unwrap();

        let entry = table.get(&addr).unwrap().unwrap();
        assert!(entry.version <= entry.highest_known_version);
        assert_eq!(entry.highest_known_version, 30);
    }
}
