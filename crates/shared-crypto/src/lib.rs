//! # Shared Crypto - Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | Keccak256 | Signing digests, address derivation |
//! | `ecdsa` | secp256k1 (recoverable) | Validator identity signing |
//! | `sealed` | secp256k1 ECDH + XChaCha20-Poly1305 | Per-recipient payload encryption |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, recovery-id carried so the
//!   signer never travels on the wire
//! - **XChaCha20**: 192-bit nonce, constant-time, side-channel immune
//! - Secret key material zeroized on drop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod sealed;

pub use ecdsa::{recover, Keypair, PublicKey, RecoverableSignature};
pub use errors::CryptoError;
pub use hashing::keccak256;
pub use sealed::{open, seal};
