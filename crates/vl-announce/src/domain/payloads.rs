//! Code-specific wire payloads.

use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use shared_crypto::{keccak256, recover, CryptoError, RecoverableSignature};
use shared_types::{Address, Hash, Version};
use vl_enode_db::SignedVersionEntry;

/// Salt mixed into the version-row signing payload so the signature is valid
/// for this protocol only and cannot be replayed into another signed
/// structure with the same field shape.
pub const VERSION_SIGNATURE_SALT: &[u8] = b"signedAnnounceVersion";

/// Digest a validator signs to announce `version`.
pub fn version_signing_digest(version: Version) -> Hash {
    let mut s = RlpStream::new_list(2);
    s.append(&VERSION_SIGNATURE_SALT.to_vec());
    s.append(&version);
    keccak256(&s.out())
}

/// One row of a version share: `(version, signature)`.
///
/// Address and public key are never transmitted; both are recovered from the
/// signature, collapsing spoof-resistance and identity into one check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRow {
    /// Announced version.
    pub version: Version,
    /// Recoverable signature over the salted version digest.
    pub signature: RecoverableSignature,
}

impl VersionRow {
    /// Wire row for a stored entry.
    pub fn from_entry(entry: &SignedVersionEntry) -> Self {
        Self {
            version: entry.version,
            signature: entry.signature,
        }
    }

    /// Recover the signer, yielding a full table entry.
    pub fn recover(&self) -> Result<SignedVersionEntry, CryptoError> {
        let public_key = recover(&version_signing_digest(self.version), &self.signature)?;
        Ok(SignedVersionEntry::new(
            public_key,
            self.version,
            self.signature,
        ))
    }
}

impl Encodable for VersionRow {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.version);
        s.append(&self.signature.as_bytes().to_vec());
    }
}

impl Decodable for VersionRow {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let version: Version = rlp.val_at(0)?;
        let sig_bytes: Vec<u8> = rlp.val_at(1)?;
        let signature = RecoverableSignature::from_slice(&sig_bytes)
            .map_err(|_| DecoderError::Custom("bad signature length"))?;
        Ok(Self { version, signature })
    }
}

/// Encode a version share payload (a bare RLP list of rows — no envelope).
pub fn encode_version_rows(rows: &[VersionRow]) -> Vec<u8> {
    let mut s = RlpStream::new();
    s.append_list(rows);
    s.out().to_vec()
}

/// Decode a version share payload.
pub fn decode_version_rows(bytes: &[u8]) -> Result<Vec<VersionRow>, DecoderError> {
    Rlp::new(bytes).as_list()
}

/// The local enode URL sealed for exactly one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnodeUrl {
    /// Who may open this entry.
    pub dest_address: Address,
    /// Sealed URL bytes.
    pub ciphertext: Vec<u8>,
}

impl Encodable for EncryptedEnodeUrl {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.dest_address.as_bytes().to_vec());
        s.append(&self.ciphertext);
    }
}

impl Decodable for EncryptedEnodeUrl {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let address_bytes: Vec<u8> = rlp.val_at(0)?;
        let ciphertext: Vec<u8> = rlp.val_at(1)?;
        let dest_address =
            Address::from_slice(&address_bytes).ok_or(DecoderError::Custom("bad address length"))?;
        Ok(Self {
            dest_address,
            ciphertext,
        })
    }
}

/// Inner payload of a query message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryEnodePayload {
    /// One sealed URL per stale recipient.
    pub encrypted_urls: Vec<EncryptedEnodeUrl>,
    /// The sender's announce version.
    pub version: Version,
    /// Build time of this message. Makes every retry hash differently so
    /// peer-level dedup caches do not suppress legitimate regossip.
    pub timestamp: u64,
}

impl Encodable for QueryEnodePayload {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append_list(&self.encrypted_urls);
        s.append(&self.version);
        s.append(&self.timestamp);
    }
}

impl Decodable for QueryEnodePayload {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            encrypted_urls: rlp.list_at(0)?,
            version: rlp.val_at(1)?,
            timestamp: rlp.val_at(2)?,
        })
    }
}

/// A validator's signed claim "I am this URL at this version". Travels in a
/// signed envelope; exchanged during the consensus handshake and as a direct
/// reply to a query from an already-connected peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnodeCertificate {
    /// The claimed enode URL.
    pub url: String,
    /// The announce version the URL belongs to.
    pub version: Version,
}

impl Encodable for EnodeCertificate {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.url);
        s.append(&self.version);
    }
}

impl Decodable for EnodeCertificate {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Self {
            url: rlp.val_at(0)?,
            version: rlp.val_at(1)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Keypair;

    #[test]
    fn test_version_row_sign_recover_identity() {
        let keypair = Keypair::generate();
        let signature = keypair.sign_digest(&version_signing_digest(777)).unwrap();
        let row = VersionRow {
            version: 777,
            signature,
        };

        let entry = row.recover().unwrap();
        assert_eq!(entry.address, keypair.address());
        assert_eq!(entry.version, 777);
    }

    #[test]
    fn test_version_rows_wire_round_trip() {
        let keypair = Keypair::generate();
        let rows: Vec<VersionRow> = [1u64, 2, 3]
            .iter()
            .map(|&v| VersionRow {
                version: v,
                signature: keypair.sign_digest(&version_signing_digest(v)).unwrap(),
            })
            .collect();

        let bytes = encode_version_rows(&rows);
        assert_eq!(decode_version_rows(&bytes).unwrap(), rows);
    }

    #[test]
    fn test_salt_binds_signature_to_protocol() {
        let keypair = Keypair::generate();
        // A signature over the unsalted version must not recover to the
        // same signer under the salted digest.
        let unsalted = keccak256(&rlp::encode(&42u64));
        let signature = keypair.sign_digest(&unsalted).unwrap();
        let row = VersionRow {
            version: 42,
            signature,
        };

        match row.recover() {
            Ok(entry) => assert_ne!(entry.address, keypair.address()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_query_payload_round_trip() {
        let payload = QueryEnodePayload {
            encrypted_urls: vec![
                EncryptedEnodeUrl {
                    dest_address: Address::new([1; 20]),
                    ciphertext: vec![0xDE, 0xAD],
                },
                EncryptedEnodeUrl {
                    dest_address: Address::new([2; 20]),
                    ciphertext: vec![0xBE, 0xEF],
                },
            ],
            version: 1000,
            timestamp: 1234,
        };

        let bytes = rlp::encode(&payload).to_vec();
        assert_eq!(rlp::decode::<QueryEnodePayload>(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_empty_query_payload_round_trip() {
        let payload = QueryEnodePayload {
            encrypted_urls: Vec::new(),
            version: 1,
            timestamp: 2,
        };
        let bytes = rlp::encode(&payload).to_vec();
        assert_eq!(rlp::decode::<QueryEnodePayload>(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_certificate_round_trip() {
        let cert = EnodeCertificate {
            url: format!("enode://{}@1.2.3.4:30303", "ee".repeat(64)),
            version: 99,
        };
        let bytes = rlp::encode(&cert).to_vec();
        assert_eq!(rlp::decode::<EnodeCertificate>(&bytes).unwrap(), cert);
    }
}
