//! Error types for the endpoint database.

use thiserror::Error;

/// Errors from the durable tables and their backing stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Underlying key-value store I/O failure.
    #[error("store I/O error: {0}")]
    Io(String),

    /// A stored row failed to decode.
    #[error("corrupt table row: {0}")]
    Corrupt(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<rlp::DecoderError> for StoreError {
    fn from(e: rlp::DecoderError) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}
