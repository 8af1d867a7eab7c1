//! Testing utilities.
//!
//! Deterministic implementations of the outbound ports, used by this crate's
//! tests and available to host applications for theirs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use shared_crypto::Keypair;
use shared_types::{Address, Node, NodeId, Timestamp};

use crate::domain::{AnnounceError, MessageCode};
use crate::ports::{ConsensusView, Gossip, LocalNode, Peer, PeerPurpose, TimeSource};

/// A time source that returns a configurable timestamp.
///
/// Starts fixed and can be advanced explicitly, so cooldowns and backoffs
/// are exercised without real waiting.
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    timestamp: Mutex<u64>,
}

impl FixedTimeSource {
    /// Create a time source pinned at `timestamp` seconds.
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp: Mutex::new(timestamp),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, secs: u64) {
        *self.timestamp.lock() += secs;
    }

    /// Pin the clock to an absolute value.
    pub fn set(&self, timestamp: u64) {
        *self.timestamp.lock() = timestamp;
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(*self.timestamp.lock())
    }
}

/// A peer that records everything sent to it.
pub struct MockPeer {
    node_id: NodeId,
    sent: Mutex<Vec<(MessageCode, Vec<u8>)>>,
}

impl MockPeer {
    /// A peer with the given identity.
    pub fn new(node_id: NodeId) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Drain the recorded sends.
    pub fn take_sent(&self) -> Vec<(MessageCode, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Peer for MockPeer {
    fn send(&self, code: MessageCode, payload: Vec<u8>) -> Result<(), AnnounceError> {
        self.sent.lock().push((code, payload));
        Ok(())
    }

    fn node_id(&self) -> NodeId {
        self.node_id
    }
}

/// A transport that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGossip;

impl Gossip for NullGossip {
    fn multicast(
        &self,
        _dests: Option<&[Address]>,
        _payload: Vec<u8>,
        _code: MessageCode,
    ) -> Result<(), AnnounceError> {
        Ok(())
    }

    fn find_peers(
        &self,
        _ids: &[NodeId],
        _purpose: PeerPurpose,
    ) -> HashMap<NodeId, Arc<dyn Peer>> {
        HashMap::new()
    }
}

/// One recorded multicast.
#[derive(Clone, Debug)]
pub struct Multicast {
    /// Destination subset, or `None` for all peers.
    pub dests: Option<Vec<Address>>,
    /// Wire payload.
    pub payload: Vec<u8>,
    /// Message code.
    pub code: MessageCode,
}

/// A transport that records multicasts and serves a fixed peer registry.
#[derive(Default)]
pub struct RecordingGossip {
    multicasts: Mutex<Vec<Multicast>>,
    peers: RwLock<HashMap<NodeId, Arc<dyn Peer>>>,
}

impl RecordingGossip {
    /// An empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected peer for `find_peers` lookups.
    pub fn add_peer(&self, peer: Arc<MockPeer>) {
        let id = peer.node_id();
        self.peers.write().insert(id, peer as Arc<dyn Peer>);
    }

    /// Drain the recorded multicasts.
    pub fn take_multicasts(&self) -> Vec<Multicast> {
        std::mem::take(&mut *self.multicasts.lock())
    }

    /// Recorded multicasts of one message code, without draining.
    pub fn multicasts_of(&self, code: MessageCode) -> Vec<Multicast> {
        self.multicasts
            .lock()
            .iter()
            .filter(|m| m.code == code)
            .cloned()
            .collect()
    }
}

impl Gossip for RecordingGossip {
    fn multicast(
        &self,
        dests: Option<&[Address]>,
        payload: Vec<u8>,
        code: MessageCode,
    ) -> Result<(), AnnounceError> {
        self.multicasts.lock().push(Multicast {
            dests: dests.map(|d| d.to_vec()),
            payload,
            code,
        });
        Ok(())
    }

    fn find_peers(
        &self,
        ids: &[NodeId],
        _purpose: PeerPurpose,
    ) -> HashMap<NodeId, Arc<dyn Peer>> {
        let peers = self.peers.read();
        ids.iter()
            .filter_map(|id| peers.get(id).map(|p| (*id, Arc::clone(p))))
            .collect()
    }
}

/// A consensus view with a settable active set.
pub struct StaticConsensus {
    self_address: Address,
    active: RwLock<HashSet<Address>>,
    core_running: RwLock<bool>,
}

impl StaticConsensus {
    /// A running core with the given membership.
    pub fn new(self_address: Address, active: HashSet<Address>) -> Self {
        Self {
            self_address,
            active: RwLock::new(active),
            core_running: RwLock::new(true),
        }
    }

    /// Replace the active set.
    pub fn set_active(&self, active: HashSet<Address>) {
        *self.active.write() = active;
    }

    /// Flip the core-running flag.
    pub fn set_core_running(&self, running: bool) {
        *self.core_running.write() = running;
    }
}

impl ConsensusView for StaticConsensus {
    fn active_set(&self) -> HashSet<Address> {
        self.active.read().clone()
    }

    fn self_address(&self) -> Address {
        self.self_address
    }

    fn is_core_running(&self) -> bool {
        *self.core_running.read()
    }
}

/// A local node view for a plain (non-proxy) validator, with optional proxy
/// wiring for proxy-mode tests.
pub struct StaticLocalNode {
    node: Node,
    is_proxy: bool,
    proxied_peer: Option<Arc<MockPeer>>,
    proxied_validator: Option<Address>,
}

impl StaticLocalNode {
    /// A plain validator listening on `port`, identity from `keypair`.
    pub fn new(keypair: &Keypair, port: u16) -> Self {
        Self {
            node: node_for(keypair, port),
            is_proxy: false,
            proxied_peer: None,
            proxied_validator: None,
        }
    }

    /// A proxy fronting `validator`, connected to it via `proxied_peer`.
    pub fn proxy_for(
        keypair: &Keypair,
        port: u16,
        validator: Address,
        proxied_peer: Arc<MockPeer>,
    ) -> Self {
        Self {
            node: node_for(keypair, port),
            is_proxy: true,
            proxied_peer: Some(proxied_peer),
            proxied_validator: Some(validator),
        }
    }
}

impl LocalNode for StaticLocalNode {
    fn self_node(&self) -> Node {
        self.node.clone()
    }

    fn is_proxy(&self) -> bool {
        self.is_proxy
    }

    fn proxied_peer(&self) -> Option<Arc<dyn Peer>> {
        self.proxied_peer
            .as_ref()
            .map(|p| Arc::clone(p) as Arc<dyn Peer>)
    }

    fn proxied_validator_address(&self) -> Option<Address> {
        self.proxied_validator
    }
}

/// The enode record a keypair's node would advertise on `port`.
pub fn node_for(keypair: &Keypair, port: u16) -> Node {
    Node {
        id: keypair.public_key().node_id(),
        host: "127.0.0.1".to_string(),
        tcp_port: port,
        udp_port: port,
    }
}
