//! Service layer: protocol handlers and the announce loop.

pub mod announce_loop;
pub mod certificate;
pub mod query;
pub mod versions;

pub use announce_loop::{spawn_announce_loop, AnnounceHandle};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use shared_types::{Address, Timestamp};
use tokio::sync::mpsc;
use tracing::debug;
use vl_enode_db::{ValEnodeTable, VersionTable};

use crate::domain::{AnnounceConfig, AnnounceError, Message};
use crate::ports::{AnnounceApi, ConsensusView, Gossip, LocalNode, Peer, TimeSource, ValidatorKeys};

/// The cached handshake credential: the signed certificate message and the
/// version it carries.
pub(crate) struct CachedCertificate {
    pub(crate) message: Message,
    pub(crate) version: u64,
}

/// The announce protocol service.
///
/// Owns the two durable tables, the in-memory gossip dedup maps, and the
/// cached endpoint certificate. Handlers run on transport threads; the
/// announce loop drives the periodic work through the same instance.
pub struct AnnounceService {
    pub(crate) config: AnnounceConfig,
    pub(crate) version_table: Arc<VersionTable>,
    pub(crate) val_enode_table: Arc<ValEnodeTable>,
    pub(crate) gossip: Arc<dyn Gossip>,
    pub(crate) consensus: Arc<dyn ConsensusView>,
    pub(crate) local: Arc<dyn LocalNode>,
    pub(crate) keys: Arc<dyn ValidatorKeys>,
    pub(crate) time: Arc<dyn TimeSource>,

    /// Last time we regossiped a query from each source address.
    pub(crate) last_query_gossiped: RwLock<HashMap<Address, Timestamp>>,
    /// Last time we regossiped a version row from each source address.
    pub(crate) last_version_gossiped: RwLock<HashMap<Address, Timestamp>>,
    /// Current handshake credential.
    pub(crate) certificate: Mutex<Option<CachedCertificate>>,

    /// Capacity-1 kick channel into the loop; bursts collapse to one build.
    query_kick: mpsc::Sender<()>,
}

/// Everything an [`AnnounceService`] depends on.
pub struct AnnounceDeps {
    /// Signed version table.
    pub version_table: Arc<VersionTable>,
    /// Endpoint table.
    pub val_enode_table: Arc<ValEnodeTable>,
    /// Transport.
    pub gossip: Arc<dyn Gossip>,
    /// Membership view.
    pub consensus: Arc<dyn ConsensusView>,
    /// Local node / proxy view.
    pub local: Arc<dyn LocalNode>,
    /// Validator key operations.
    pub keys: Arc<dyn ValidatorKeys>,
    /// Clock.
    pub time: Arc<dyn TimeSource>,
}

impl AnnounceService {
    /// Build the service. Returns the receiving half of the query kick
    /// channel, which [`spawn_announce_loop`] consumes.
    pub fn new(config: AnnounceConfig, deps: AnnounceDeps) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (query_kick, kick_rx) = mpsc::channel(1);
        let service = Arc::new(Self {
            config,
            version_table: deps.version_table,
            val_enode_table: deps.val_enode_table,
            gossip: deps.gossip,
            consensus: deps.consensus,
            local: deps.local,
            keys: deps.keys,
            time: deps.time,
            last_query_gossiped: RwLock::new(HashMap::new()),
            last_version_gossiped: RwLock::new(HashMap::new()),
            certificate: Mutex::new(None),
            query_kick,
        });
        (service, kick_rx)
    }

    /// Protocol configuration.
    pub fn config(&self) -> &AnnounceConfig {
        &self.config
    }

    /// Signal the loop to build a query. Non-blocking: while one signal is
    /// pending, further signals are dropped.
    pub fn kick_query(&self) {
        let _ = self.query_kick.try_send(());
    }

    /// Whether this node should announce: consensus core running and our own
    /// address in the active set.
    pub(crate) fn should_announce(&self) -> bool {
        self.consensus.is_core_running()
            && self
                .consensus
                .active_set()
                .contains(&self.consensus.self_address())
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.time.now()
    }

    /// The URL this node announces: the proxy's external endpoint when
    /// proxied, otherwise our own.
    pub(crate) fn local_enode_url(&self) -> Result<String, AnnounceError> {
        if self.local.is_proxied() {
            return self
                .local
                .proxy_external_node()
                .map(|n| n.to_url())
                .ok_or(AnnounceError::NoProxyConnection);
        }
        Ok(self.local.self_node().to_url())
    }

    /// Drop announce state for addresses that left the active set.
    ///
    /// Dedup map entries are kept until their cooldown has also lapsed, so a
    /// validator bouncing out and back in cannot use the gap to flood.
    pub fn prune_announce_data_structures(&self) -> Result<(), AnnounceError> {
        let active = self.consensus.active_set();
        let now = self.now();

        let query_cooldown = self.config.query_gossip_cooldown.as_secs();
        self.last_query_gossiped.write().retain(|address, last| {
            let keep = active.contains(address) || now.saturating_since(*last) < query_cooldown;
            if !keep {
                debug!(address = %address, "pruning query regossip state");
            }
            keep
        });
        self.val_enode_table.prune_entries(&active)?;

        let version_cooldown = self.config.version_gossip_cooldown.as_secs();
        self.last_version_gossiped.write().retain(|address, last| {
            let keep = active.contains(address) || now.saturating_since(*last) < version_cooldown;
            if !keep {
                debug!(address = %address, "pruning version regossip state");
            }
            keep
        });
        self.version_table.prune(&active)?;

        Ok(())
    }
}

impl AnnounceApi for AnnounceService {
    fn handle_query_enode(&self, payload: &[u8]) -> Result<(), AnnounceError> {
        AnnounceService::handle_query_enode(self, payload)
    }

    fn handle_version_share(&self, payload: &[u8]) -> Result<(), AnnounceError> {
        AnnounceService::handle_version_share(self, payload)
    }

    fn handle_enode_certificate(
        &self,
        from: &dyn Peer,
        payload: &[u8],
    ) -> Result<(), AnnounceError> {
        AnnounceService::handle_enode_certificate(self, from, payload)
    }

    fn send_version_table(&self, peer: &dyn Peer) -> Result<(), AnnounceError> {
        AnnounceService::send_version_table(self, peer)
    }

    fn update_announce_version(&self) -> Result<(), AnnounceError> {
        AnnounceService::update_announce_version(self)
    }

    fn retrieve_enode_certificate(&self) -> Option<Vec<u8>> {
        AnnounceService::retrieve_enode_certificate(self)
    }
}
