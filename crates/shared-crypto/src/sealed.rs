//! Per-recipient sealed payloads.
//!
//! ECIES-style construction: an ephemeral secp256k1 key agrees a shared
//! secret with the recipient's public key, a symmetric key is derived from
//! it, and the payload is sealed under XChaCha20-Poly1305. Only the holder of
//! the recipient's private key can open the payload.
//!
//! Wire layout: `ephemeral pubkey (33) || nonce (24) || AEAD ciphertext`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use k256::ecdh::{self, EphemeralSecret};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::ecdsa::{Keypair, PublicKey};
use crate::errors::CryptoError;

const EPHEMERAL_LEN: usize = 33;
const NONCE_LEN: usize = 24;

/// Derive the AEAD key from the ECDH secret and the ephemeral public key.
fn derive_key(shared_secret: &[u8], ephemeral_pub: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(ephemeral_pub);
    hasher.finalize().into()
}

/// Seal `plaintext` so only `recipient` can open it.
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let recipient_pk = k256::PublicKey::from_sec1_bytes(&recipient.to_compressed_bytes())
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let ephemeral = EphemeralSecret::random(&mut rand::thread_rng());
    let ephemeral_pub = ephemeral.public_key().to_sec1_bytes();

    let shared = ephemeral.diffie_hellman(&recipient_pk);
    let key = derive_key(shared.raw_secret_bytes().as_slice(), &ephemeral_pub);

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut sealed = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&ephemeral_pub);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed payload with the recipient's keypair.
pub fn open(keypair: &Keypair, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < EPHEMERAL_LEN + NONCE_LEN {
        return Err(CryptoError::CiphertextTooShort);
    }
    let (ephemeral_pub, rest) = sealed.split_at(EPHEMERAL_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let ephemeral_pk = k256::PublicKey::from_sec1_bytes(ephemeral_pub)
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let shared = ecdh::diffie_hellman(
        keypair.signing_key().as_nonzero_scalar(),
        ephemeral_pk.as_affine(),
    );
    let key = derive_key(shared.raw_secret_bytes().as_slice(), ephemeral_pub);

    let cipher = XChaCha20Poly1305::new((&key).into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
