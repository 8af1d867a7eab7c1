//! Ports layer.

pub mod inbound;
pub mod outbound;

pub use inbound::AnnounceApi;
pub use outbound::{
    ConsensusView, Gossip, LocalNode, Peer, PeerPurpose, SystemTimeSource, TimeSource,
    ValidatorKeys,
};
