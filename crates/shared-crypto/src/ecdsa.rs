//! Recoverable ECDSA over secp256k1.
//!
//! Signatures are 65 bytes (`r || s || v`). The recovery id `v` lets a
//! receiver reconstruct the signer's public key from the signature alone, so
//! protocol messages never carry an explicit signer field that could be
//! spoofed independently of the signature.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use shared_types::{Address, Hash, NodeId};
use zeroize::Zeroize;

use crate::errors::CryptoError;
use crate::hashing::keccak256;

/// secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse from SEC1 bytes (compressed 33 or uncompressed 65).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed SEC1 encoding (33 bytes).
    pub fn to_compressed_bytes(&self) -> [u8; 33] {
        let point = self.0.to_encoded_point(true);
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    /// Derive the 20-byte validator address: last 20 bytes of the keccak256
    /// of the uncompressed key without its SEC1 prefix byte.
    pub fn address(&self) -> Address {
        let point = self.0.to_encoded_point(false);
        let hash = keccak256(&point.as_bytes()[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..]);
        Address::new(addr)
    }

    /// Derive the 64-byte node identity (uncompressed key, prefix stripped).
    pub fn node_id(&self) -> NodeId {
        let point = self.0.to_encoded_point(false);
        let mut id = [0u8; 64];
        id.copy_from_slice(&point.as_bytes()[1..]);
        NodeId::new(id)
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}…)", &hex::encode(self.to_compressed_bytes())[..10])
    }
}

/// 65-byte recoverable signature (`r || s || v`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; 65]);

impl RecoverableSignature {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    /// Create from a slice. Rejects anything but 65 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 65 {
            return Err(CryptoError::InvalidSignature);
        }
        let mut sig = [0u8; 65];
        sig.copy_from_slice(bytes);
        Ok(Self(sig))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

impl std::fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}…)", &hex::encode(self.0)[..10])
    }
}

/// secp256k1 keypair for a validator identity.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_bytes((&bytes).into())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Public half of the keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(*self.signing_key.verifying_key())
    }

    /// Validator address of this keypair.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_digest(&self, digest: &Hash) -> Result<RecoverableSignature, CryptoError> {
        let (sig, recid): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| CryptoError::InvalidSignature)?;

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&sig.to_bytes());
        bytes[64] = recid.to_byte();
        Ok(RecoverableSignature(bytes))
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

/// Recover the signer's public key from a digest and recoverable signature.
///
/// Accepts both raw recovery ids (0/1) and the legacy 27/28 convention.
pub fn recover(
    digest: &Hash,
    signature: &RecoverableSignature,
) -> Result<PublicKey, CryptoError> {
    let bytes = signature.as_bytes();

    let v = if bytes[64] >= 27 { bytes[64] - 27 } else { bytes[64] };
    let recid = RecoveryId::from_byte(v).ok_or(CryptoError::InvalidSignature)?;

    let sig = Signature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidSignature)?;

    VerifyingKey::recover_from_prehash(digest, &sig, recid)
        .map(PublicKey)
        .map_err(|_| CryptoError::RecoveryFailed)
}
