//! # Validator Endpoint Announcement
//!
//! Continuous, versioned discovery of validator endpoints for a permissioned
//! BFT network. Every validator learns the current enode URL of every other
//! active validator so the consensus layer can form a dense overlay.
//!
//! Three cooperating pieces:
//!
//! - a flooded, signed **version share** message that tells the network how
//!   recent each validator's endpoint is, without carrying any URL
//! - a throttled, per-recipient-encrypted **query** message that actually
//!   delivers the URL to validators known to be behind
//! - an **announce loop** that ticks membership, shares the version table,
//!   prunes, and retries queries
//!
//! The crate follows Hexagonal Architecture:
//! - **Domain Layer:** wire messages, validation rules, backoff policy
//! - **Ports Layer:** traits for transport, consensus view, keys, and time
//! - **Service Layer:** the protocol handlers and the timer-driven loop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod ports;
pub mod service;
pub mod testing;

pub use domain::{AnnounceConfig, AnnounceError, EnodeCertificate, Message, MessageCode};
pub use ports::{
    AnnounceApi, ConsensusView, Gossip, LocalNode, Peer, PeerPurpose, TimeSource, ValidatorKeys,
};
pub use service::{spawn_announce_loop, AnnounceDeps, AnnounceHandle, AnnounceService};
