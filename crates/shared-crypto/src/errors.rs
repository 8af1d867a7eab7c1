//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from signing, recovery, and encryption primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Public key bytes do not describe a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Private key bytes are out of range for the curve.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// Signature bytes are malformed (length or scalar range).
    #[error("invalid signature")]
    InvalidSignature,

    /// Public key recovery from a signature failed.
    #[error("signer recovery failed")]
    RecoveryFailed,

    /// AEAD encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// AEAD decryption failed (wrong key or tampered ciphertext).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Sealed payload is too short to carry its header.
    #[error("sealed payload truncated")]
    CiphertextTooShort,
}
