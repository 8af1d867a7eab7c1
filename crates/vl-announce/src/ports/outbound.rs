//! # Outbound Ports (Driven Ports)
//!
//! Interfaces the host node must implement: the p2p transport, the consensus
//! engine's membership view, the validator key, and a time source. The
//! protocol never talks to a socket or a clock directly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shared_crypto::{CryptoError, Keypair, PublicKey, RecoverableSignature};
use shared_types::{Address, Hash, Node, NodeId, Timestamp};

use crate::domain::{AnnounceError, MessageCode};

/// A connected peer on the transport.
pub trait Peer: Send + Sync {
    /// Send a protocol payload to this peer.
    fn send(&self, code: MessageCode, payload: Vec<u8>) -> Result<(), AnnounceError>;

    /// Stable identity of the remote node.
    fn node_id(&self) -> NodeId;
}

/// Which peer connections a lookup may match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerPurpose {
    /// Any existing connection.
    Any,
    /// Connections established for consensus.
    Validator,
}

/// The gossip transport.
pub trait Gossip: Send + Sync {
    /// Deliver `payload` to all current peers, or to the subset whose
    /// addresses are given.
    fn multicast(
        &self,
        dests: Option<&[Address]>,
        payload: Vec<u8>,
        code: MessageCode,
    ) -> Result<(), AnnounceError>;

    /// Look up live peer connections by node id.
    fn find_peers(
        &self,
        ids: &[NodeId],
        purpose: PeerPurpose,
    ) -> HashMap<NodeId, Arc<dyn Peer>>;
}

/// The consensus engine's view of membership.
pub trait ConsensusView: Send + Sync {
    /// Addresses currently eligible to participate in rounds.
    fn active_set(&self) -> HashSet<Address>;

    /// This node's validator address.
    fn self_address(&self) -> Address;

    /// Whether the consensus core is running.
    fn is_core_running(&self) -> bool;
}

/// The p2p server's view of this node and its proxy deployment, if any.
pub trait LocalNode: Send + Sync {
    /// This node's own enode record.
    fn self_node(&self) -> Node;

    /// True when this node is a validator fronted by a proxy.
    fn is_proxied(&self) -> bool {
        false
    }

    /// The proxy's externally reachable enode, for a proxied validator.
    fn proxy_external_node(&self) -> Option<Node> {
        None
    }

    /// Live connection to our proxy, for a proxied validator.
    fn proxy_peer(&self) -> Option<Arc<dyn Peer>> {
        None
    }

    /// True when this node fronts a validator as its proxy.
    fn is_proxy(&self) -> bool {
        false
    }

    /// Live connection to the proxied validator, for a proxy.
    fn proxied_peer(&self) -> Option<Arc<dyn Peer>> {
        None
    }

    /// Address of the proxied validator, for a proxy.
    fn proxied_validator_address(&self) -> Option<Address> {
        None
    }
}

/// Signing and decryption with the node's validator key.
pub trait ValidatorKeys: Send + Sync {
    /// The validator's public key.
    fn public_key(&self) -> PublicKey;

    /// Sign a 32-byte digest.
    fn sign_digest(&self, digest: &Hash) -> Result<RecoverableSignature, CryptoError>;

    /// Open a payload sealed to the validator's key.
    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

impl ValidatorKeys for Keypair {
    fn public_key(&self) -> PublicKey {
        Keypair::public_key(self)
    }

    fn sign_digest(&self, digest: &Hash) -> Result<RecoverableSignature, CryptoError> {
        Keypair::sign_digest(self, digest)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        shared_crypto::open(self, sealed)
    }
}

/// Abstract time, so protocol timing is testable with fixed clocks.
pub trait TimeSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> Timestamp;
}

/// Production time source backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp::new(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_implements_validator_keys() {
        let keypair = Keypair::generate();
        let keys: &dyn ValidatorKeys = &keypair;

        let sealed = shared_crypto::seal(&keys.public_key(), b"payload").unwrap();
        assert_eq!(keys.decrypt(&sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_system_time_source_advances() {
        let now = SystemTimeSource.now();
        assert!(now.as_secs() > 1_600_000_000);
    }
}
