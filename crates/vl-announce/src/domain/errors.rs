//! Error types for the announce protocol.
//!
//! None of these are fatal to the announce loop: handlers return them to the
//! transport layer, tick arms log them, and the protocol self-heals on the
//! next cycle.

use shared_crypto::CryptoError;
use shared_types::Address;
use thiserror::Error;
use vl_enode_db::StoreError;

/// Errors surfaced by the announce protocol.
#[derive(Debug, Error)]
pub enum AnnounceError {
    /// Message from an address outside the active validator set. Dropped;
    /// the sender is not penalised here.
    #[error("sender {0} is not in the active validator set")]
    UnauthorizedSender(Address),

    /// Decode failure, bad URL, or a signature that does not verify.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Structurally valid but rejected: duplicates, oversize list, version
    /// regress.
    #[error("message rejected: {0}")]
    ValidationRejected(&'static str),

    /// Underlying key-value store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Encrypt/decrypt/sign failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Transport send failure; retry is left to the periodic cadence.
    #[error("transport send failed: {0}")]
    Transport(String),

    /// This node is proxied but has no live proxy connection.
    #[error("no proxy connection")]
    NoProxyConnection,
}

impl From<rlp::DecoderError> for AnnounceError {
    fn from(e: rlp::DecoderError) -> Self {
        AnnounceError::Malformed(e.to_string())
    }
}

impl From<shared_types::EnodeUrlError> for AnnounceError {
    fn from(e: shared_types::EnodeUrlError) -> Self {
        AnnounceError::Malformed(e.to_string())
    }
}
