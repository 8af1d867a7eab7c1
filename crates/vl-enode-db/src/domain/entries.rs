//! Table row types.
//!
//! `SignedVersionEntry` rows live in the version table; `AddressEntry` rows
//! live in the val-enode table. Both serialize to RLP for storage. The store
//! key carries the address, so serialized rows never repeat it — a
//! `SignedVersionEntry` re-derives its address from the public key, and an
//! `AddressEntry` is decoded against the address its key named.

use rlp::{Rlp, RlpStream};
use shared_types::{Address, Node, Timestamp, Version};
use shared_crypto::{PublicKey, RecoverableSignature};

use super::errors::StoreError;

/// A validator's most recent signed announce version.
///
/// The signature has already been verified and the public key recovered by
/// the time a row reaches the table; the table trusts its inputs and only
/// enforces version monotonicity.
#[derive(Clone, Debug)]
pub struct SignedVersionEntry {
    /// Validator address, derived from `public_key`.
    pub address: Address,
    /// Recovered signer key.
    pub public_key: PublicKey,
    /// Announce version the signature covers.
    pub version: Version,
    /// Recoverable signature over the salted version payload.
    pub signature: RecoverableSignature,
}

impl SignedVersionEntry {
    /// Build an entry from a recovered key, deriving the address.
    pub fn new(public_key: PublicKey, version: Version, signature: RecoverableSignature) -> Self {
        Self {
            address: public_key.address(),
            public_key,
            version,
            signature,
        }
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(3);
        s.append(&self.public_key.to_compressed_bytes().to_vec());
        s.append(&self.version);
        s.append(&self.signature.as_bytes().to_vec());
        s.out().to_vec()
    }

    /// Deserialize a stored row.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let rlp = Rlp::new(bytes);
        let pubkey_bytes: Vec<u8> = rlp.val_at(0)?;
        let version: Version = rlp.val_at(1)?;
        let sig_bytes: Vec<u8> = rlp.val_at(2)?;

        let public_key = PublicKey::from_sec1_bytes(&pubkey_bytes)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let signature = RecoverableSignature::from_slice(&sig_bytes)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Self::new(public_key, version, signature))
    }
}

/// Query bookkeeping carried by an [`AddressEntryUpdate`].
///
/// Tagged with the endpoint version it was computed against so a slow query
/// pass cannot clobber counters that belong to a newer endpoint.
#[derive(Clone, Copy, Debug)]
pub struct QueryBookkeeping {
    /// The entry version these counters belong to.
    pub for_version: Version,
    /// Attempts made for that version.
    pub num_attempts: u32,
    /// When the latest attempt was sent.
    pub last_query_timestamp: Timestamp,
}

/// One row of the val-enode table.
#[derive(Clone, Debug)]
pub struct AddressEntry {
    /// Validator address (also the table key).
    pub address: Address,
    /// The endpoint we hold for this validator, once delivered.
    pub node: Option<Node>,
    /// Signer key learned from version gossip; enables encrypting queries.
    pub public_key: Option<PublicKey>,
    /// Version matched to `node`.
    pub version: Version,
    /// Largest version ever announced for this address.
    pub highest_known_version: Version,
    /// Queries sent for the current `version`.
    pub num_query_attempts: u32,
    /// When the latest query for the current `version` went out.
    pub last_query_timestamp: Option<Timestamp>,
}

impl AddressEntry {
    /// A blank row for an address nothing is known about yet.
    pub fn empty(address: Address) -> Self {
        Self {
            address,
            node: None,
            public_key: None,
            version: 0,
            highest_known_version: 0,
            num_query_attempts: 0,
            last_query_timestamp: None,
        }
    }

    /// An entry is stale when a newer version has been announced than the
    /// endpoint we hold; stale entries are what the query protocol chases.
    pub fn is_stale(&self) -> bool {
        self.version < self.highest_known_version
    }

    /// Merge an update into this row, field by field:
    ///
    /// - a node+version pair wins only if strictly newer, and resets the
    ///   query bookkeeping
    /// - `highest_known_version` only ever grows
    /// - a public key is stored as-is (idempotent)
    /// - bookkeeping applies only if tagged with the current version
    ///
    /// Returns whether anything changed.
    pub fn apply(&mut self, update: &AddressEntryUpdate) -> bool {
        let mut changed = false;

        if let Some((node, version)) = &update.node {
            if *version > self.version {
                self.node = Some(node.clone());
                self.version = *version;
                self.num_query_attempts = 0;
                self.last_query_timestamp = None;
                if *version > self.highest_known_version {
                    self.highest_known_version = *version;
                }
                changed = true;
            }
        }

        if let Some(highest) = update.highest_known_version {
            if highest > self.highest_known_version {
                self.highest_known_version = highest;
                changed = true;
            }
        }

        if let Some(public_key) = update.public_key {
            if self.public_key != Some(public_key) {
                self.public_key = Some(public_key);
                changed = true;
            }
        }

        if let Some(bk) = &update.query_bookkeeping {
            if bk.for_version == self.version {
                self.num_query_attempts = bk.num_attempts;
                self.last_query_timestamp = Some(bk.last_query_timestamp);
                changed = true;
            }
        }

        changed
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        let url = self.node.as_ref().map(|n| n.to_url()).unwrap_or_default();
        let pubkey = self
            .public_key
            .map(|k| k.to_compressed_bytes().to_vec())
            .unwrap_or_default();

        let mut s = RlpStream::new_list(6);
        s.append(&url);
        s.append(&pubkey);
        s.append(&self.version);
        s.append(&self.highest_known_version);
        s.append(&self.num_query_attempts);
        s.append(&self.last_query_timestamp.map(|t| t.as_secs()).unwrap_or(0));
        s.out().to_vec()
    }

    /// Deserialize a stored row keyed by `address`.
    pub fn from_bytes(address: Address, bytes: &[u8]) -> Result<Self, StoreError> {
        let rlp = Rlp::new(bytes);
        let url: String = rlp.val_at(0)?;
        let pubkey_bytes: Vec<u8> = rlp.val_at(1)?;
        let version: Version = rlp.val_at(2)?;
        let highest_known_version: Version = rlp.val_at(3)?;
        let num_query_attempts: u32 = rlp.val_at(4)?;
        let last_query_secs: u64 = rlp.val_at(5)?;

        let node = if url.is_empty() {
            None
        } else {
            Some(url.parse().map_err(|e: shared_types::EnodeUrlError| {
                StoreError::Corrupt(e.to_string())
            })?)
        };
        let public_key = if pubkey_bytes.is_empty() {
            None
        } else {
            Some(
                PublicKey::from_sec1_bytes(&pubkey_bytes)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            )
        };

        Ok(Self {
            address,
            node,
            public_key,
            version,
            highest_known_version,
            num_query_attempts,
            last_query_timestamp: if last_query_secs == 0 {
                None
            } else {
                Some(Timestamp::new(last_query_secs))
            },
        })
    }
}

/// A partial update for one address, merged into the stored row by
/// [`AddressEntry::apply`]. Only the populated fields participate.
#[derive(Clone, Debug, Default)]
pub struct AddressEntryUpdate {
    /// Target address.
    pub address: Address,
    /// A delivered endpoint and the version it belongs to.
    pub node: Option<(Node, Version)>,
    /// Signer key for this address.
    pub public_key: Option<PublicKey>,
    /// A version hint from gossip (may exceed the delivered endpoint).
    pub highest_known_version: Option<Version>,
    /// Query counters tagged with the version they were computed for.
    pub query_bookkeeping: Option<QueryBookkeeping>,
}

impl AddressEntryUpdate {
    /// Update carrying a delivered endpoint.
    pub fn endpoint(address: Address, node: Node, version: Version) -> Self {
        Self {
            address,
            node: Some((node, version)),
            ..Default::default()
        }
    }

    /// Update carrying a version hint and the signer key that announced it.
    pub fn version_hint(address: Address, public_key: PublicKey, highest: Version) -> Self {
        Self {
            address,
            public_key: Some(public_key),
            highest_known_version: Some(highest),
            ..Default::default()
        }
    }

    /// Update carrying query bookkeeping.
    pub fn bookkeeping(address: Address, bookkeeping: QueryBookkeeping) -> Self {
        Self {
            address,
            query_bookkeeping: Some(bookkeeping),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Keypair;

    fn sample_node(port: u16) -> Node {
        format!("enode://{}@127.0.0.1:{}", "ab".repeat(64), port)
            .parse()
            .unwrap()
    }

    #[test]
    fn test_signed_version_entry_round_trip() {
        let keypair = Keypair::generate();
        let sig = keypair
            .sign_digest(&shared_crypto::keccak256(b"row"))
            .unwrap();
        let entry = SignedVersionEntry::new(keypair.public_key(), 1234, sig);

        let decoded = SignedVersionEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(decoded.address, keypair.address());
        assert_eq!(decoded.version, 1234);
        assert_eq!(decoded.signature, entry.signature);
    }

    #[test]
    fn test_address_entry_round_trip() {
        let keypair = Keypair::generate();
        let entry = AddressEntry {
            address: Address::new([1; 20]),
            node: Some(sample_node(30303)),
            public_key: Some(keypair.public_key()),
            version: 10,
            highest_known_version: 12,
            num_query_attempts: 3,
            last_query_timestamp: Some(Timestamp::new(999)),
        };

        let decoded = AddressEntry::from_bytes(entry.address, &entry.to_bytes()).unwrap();
        assert_eq!(decoded.node, entry.node);
        assert_eq!(decoded.version, 10);
        assert_eq!(decoded.highest_known_version, 12);
        assert_eq!(decoded.num_query_attempts, 3);
        assert_eq!(decoded.last_query_timestamp, Some(Timestamp::new(999)));
    }

    #[test]
    fn test_address_entry_round_trip_sparse() {
        let entry = AddressEntry::empty(Address::new([2; 20]));
        let decoded = AddressEntry::from_bytes(entry.address, &entry.to_bytes()).unwrap();
        assert!(decoded.node.is_none());
        assert!(decoded.public_key.is_none());
        assert!(decoded.last_query_timestamp.is_none());
    }

    #[test]
    fn test_apply_newer_endpoint_resets_bookkeeping() {
        let addr = Address::new([3; 20]);
        let mut entry = AddressEntry {
            num_query_attempts: 4,
            last_query_timestamp: Some(Timestamp::new(50)),
            version: 5,
            highest_known_version: 9,
            ..AddressEntry::empty(addr)
        };

        let changed = entry.apply(&AddressEntryUpdate::endpoint(addr, sample_node(1), 9));
        assert!(changed);
        assert_eq!(entry.version, 9);
        assert_eq!(entry.num_query_attempts, 0);
        assert!(entry.last_query_timestamp.is_none());
        assert!(!entry.is_stale());
    }

    #[test]
    fn test_apply_rejects_version_regress() {
        let addr = Address::new([4; 20]);
        let mut entry = AddressEntry {
            version: 10,
            highest_known_version: 10,
            ..AddressEntry::empty(addr)
        };

        assert!(!entry.apply(&AddressEntryUpdate::endpoint(addr, sample_node(1), 10)));
        assert!(!entry.apply(&AddressEntryUpdate::endpoint(addr, sample_node(1), 9)));
        assert_eq!(entry.version, 10);
        assert!(entry.node.is_none());
    }

    #[test]
    fn test_apply_highest_known_only_grows() {
        let addr = Address::new([5; 20]);
        let keypair = Keypair::generate();
        let mut entry = AddressEntry::empty(addr);

        assert!(entry.apply(&AddressEntryUpdate::version_hint(addr, keypair.public_key(), 7)));
        assert!(entry.is_stale());
        assert!(!entry.apply(&AddressEntryUpdate::version_hint(addr, keypair.public_key(), 6)));
        assert_eq!(entry.highest_known_version, 7);
    }

    #[test]
    fn test_apply_bookkeeping_requires_matching_version() {
        let addr = Address::new([6; 20]);
        let mut entry = AddressEntry {
            version: 3,
            highest_known_version: 5,
            ..AddressEntry::empty(addr)
        };

        // Stale bookkeeping (computed for version 2) must not land.
        assert!(!entry.apply(&AddressEntryUpdate::bookkeeping(
            addr,
            QueryBookkeeping {
                for_version: 2,
                num_attempts: 9,
                last_query_timestamp: Timestamp::new(100),
            }
        )));
        assert_eq!(entry.num_query_attempts, 0);

        assert!(entry.apply(&AddressEntryUpdate::bookkeeping(
            addr,
            QueryBookkeeping {
                for_version: 3,
                num_attempts: 1,
                last_query_timestamp: Timestamp::new(100),
            }
        )));
        assert_eq!(entry.num_query_attempts, 1);
    }

    #[test]
    fn test_endpoint_newer_than_hint_keeps_invariant() {
        // A delivered endpoint above the current hint must drag
        // highest_known_version with it.
        let addr = Address::new([7; 20]);
        let mut entry = AddressEntry {
            version: 1,
            highest_known_version: 2,
            ..AddressEntry::empty(addr)
        };
        entry.apply(&AddressEntryUpdate::endpoint(addr, sample_node(1), 8));
        assert_eq!(entry.version, 8);
        assert_eq!(entry.highest_known_version, 8);
        assert!(entry.version <= entry.highest_known_version);
    }
}
