//! # Inbound Ports (Driving API)
//!
//! What the transport's message dispatch and the consensus handshake call
//! into. All handlers are synchronous and run on transport worker threads;
//! they never block on the announce loop.

use crate::domain::AnnounceError;

use super::outbound::Peer;

/// Message handling surface of the announce protocol.
pub trait AnnounceApi: Send + Sync {
    /// Handle a received query message (encrypted endpoint delivery).
    fn handle_query_enode(&self, payload: &[u8]) -> Result<(), AnnounceError>;

    /// Handle a received version share (flat version-vector flood).
    fn handle_version_share(&self, payload: &[u8]) -> Result<(), AnnounceError>;

    /// Handle a received endpoint certificate from `from`.
    fn handle_enode_certificate(&self, from: &dyn Peer, payload: &[u8])
        -> Result<(), AnnounceError>;

    /// Push the full signed version table to one peer (handshake support).
    fn send_version_table(&self, peer: &dyn Peer) -> Result<(), AnnounceError>;

    /// Bump the announce version to the current wall-clock second and share
    /// the new certificate and version row. No-ops when the clock has not
    /// advanced past the version already in force.
    fn update_announce_version(&self) -> Result<(), AnnounceError>;

    /// The cached endpoint certificate payload, if one has been generated,
    /// for use as a handshake credential.
    fn retrieve_enode_certificate(&self) -> Option<Vec<u8>>;
}
