//! The signed message envelope.
//!
//! Query and certificate payloads travel inside a `Message`. The envelope is
//! signed over `keccak256(rlp([code, payload, address]))`; receivers recover
//! the signer from the signature and require it to match the embedded
//! address, which makes the address field unforgeable. Version shares are
//! NOT enveloped — each row in them carries its own signature.

use rlp::{Rlp, RlpStream};
use shared_crypto::{keccak256, recover, CryptoError, PublicKey, RecoverableSignature};
use shared_types::{Address, Hash};

use super::errors::AnnounceError;

/// Wire message codes exposed to the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum MessageCode {
    /// Encrypted endpoint delivery (§ query protocol).
    QueryEnode = 0x12,
    /// Flat version-vector flood.
    VersionShare = 0x13,
    /// Signed endpoint certificate.
    EnodeCertificate = 0x14,
}

impl MessageCode {
    /// Raw wire value.
    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for MessageCode {
    type Error = ();

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0x12 => Ok(Self::QueryEnode),
            0x13 => Ok(Self::VersionShare),
            0x14 => Ok(Self::EnodeCertificate),
            _ => Err(()),
        }
    }
}

/// A signed protocol message.
#[derive(Clone, Debug)]
pub struct Message {
    /// Message code, also present on the transport seam.
    pub code: MessageCode,
    /// Inner payload (RLP of the code-specific type).
    pub payload: Vec<u8>,
    /// Sender address; verified against the recovered signer.
    pub address: Address,
    /// Recoverable signature over the envelope digest.
    pub signature: RecoverableSignature,
}

impl Message {
    /// Build and sign an envelope. `sign` receives the envelope digest.
    pub fn signed_with<F>(
        code: MessageCode,
        payload: Vec<u8>,
        address: Address,
        sign: F,
    ) -> Result<Self, CryptoError>
    where
        F: FnOnce(&Hash) -> Result<RecoverableSignature, CryptoError>,
    {
        let digest = signing_digest(code, &payload, &address);
        let signature = sign(&digest)?;
        Ok(Self {
            code,
            payload,
            address,
            signature,
        })
    }

    /// Serialize to wire bytes.
    pub fn to_rlp(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(4);
        s.append(&self.code.as_u64());
        s.append(&self.payload);
        s.append(&self.address.as_bytes().to_vec());
        s.append(&self.signature.as_bytes().to_vec());
        s.out().to_vec()
    }

    /// Decode wire bytes, recover the signer, and verify it matches the
    /// embedded address. Returns the message and the recovered key.
    pub fn from_rlp(bytes: &[u8]) -> Result<(Self, PublicKey), AnnounceError> {
        let rlp = Rlp::new(bytes);
        let raw_code: u64 = rlp.val_at(0)?;
        let payload: Vec<u8> = rlp.val_at(1)?;
        let address_bytes: Vec<u8> = rlp.val_at(2)?;
        let sig_bytes: Vec<u8> = rlp.val_at(3)?;

        let code = MessageCode::try_from(raw_code)
            .map_err(|_| AnnounceError::Malformed(format!("unknown message code {raw_code:#x}")))?;
        let address = Address::from_slice(&address_bytes)
            .ok_or_else(|| AnnounceError::Malformed("bad address length".into()))?;
        let signature = RecoverableSignature::from_slice(&sig_bytes)
            .map_err(|e| AnnounceError::Malformed(e.to_string()))?;

        let digest = signing_digest(code, &payload, &address);
        let signer = recover(&digest, &signature)
            .map_err(|e| AnnounceError::Malformed(e.to_string()))?;
        if signer.address() != address {
            return Err(AnnounceError::Malformed(
                "signature does not match sender address".into(),
            ));
        }

        Ok((
            Self {
                code,
                payload,
                address,
                signature,
            },
            signer,
        ))
    }
}

fn signing_digest(code: MessageCode, payload: &[u8], address: &Address) -> Hash {
    let mut s = RlpStream::new_list(3);
    s.append(&code.as_u64());
    s.append(&payload.to_vec());
    s.append(&address.as_bytes().to_vec());
    keccak256(&s.out())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Keypair;

    fn signed(keypair: &Keypair, code: MessageCode, payload: Vec<u8>) -> Message {
        Message::signed_with(code, payload, keypair.address(), |digest| {
            keypair.sign_digest(digest)
        })
        .unwrap()
    }

    #[test]
    fn test_round_trip_recovers_sender() {
        let keypair = Keypair::generate();
        let message = signed(&keypair, MessageCode::QueryEnode, b"inner".to_vec());

        let (decoded, signer) = Message::from_rlp(&message.to_rlp()).unwrap();
        assert_eq!(decoded.code, MessageCode::QueryEnode);
        assert_eq!(decoded.payload, b"inner".to_vec());
        assert_eq!(decoded.address, keypair.address());
        assert_eq!(signer.address(), keypair.address());
    }

    #[test]
    fn test_spoofed_address_rejected() {
        let keypair = Keypair::generate();
        let mut message = signed(&keypair, MessageCode::EnodeCertificate, b"x".to_vec());
        // Claim someone else's address without re-signing.
        message.address = Address::new([9; 20]);

        assert!(matches!(
            Message::from_rlp(&message.to_rlp()),
            Err(AnnounceError::Malformed(_))
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let keypair = Keypair::generate();
        let mut message = signed(&keypair, MessageCode::QueryEnode, b"payload".to_vec());
        message.payload[0] ^= 0xFF;

        assert!(Message::from_rlp(&message.to_rlp()).is_err());
    }

    #[test]
    fn test_unknown_code_rejected() {
        let mut s = RlpStream::new_list(4);
        s.append(&0xFFu64);
        s.append(&b"p".to_vec());
        s.append(&[0u8; 20].to_vec());
        s.append(&[0u8; 65].to_vec());

        assert!(matches!(
            Message::from_rlp(&s.out()),
            Err(AnnounceError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Message::from_rlp(b"not rlp at all").is_err());
    }
}
