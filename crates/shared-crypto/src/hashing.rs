//! Keccak256 hashing.

use sha3::{Digest, Keccak256};
use shared_types::Hash;

/// Compute the Keccak256 hash of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty_input() {
        // Well-known Keccak256 of the empty string.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak256_deterministic() {
        assert_eq!(keccak256(b"valence"), keccak256(b"valence"));
        assert_ne!(keccak256(b"valence"), keccak256(b"valencf"));
    }
}
