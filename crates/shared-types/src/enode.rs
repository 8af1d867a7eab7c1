//! Enode URLs: the endpoint strings validators announce to each other.
//!
//! An enode URL binds a network address to a node identity key:
//!
//! ```text
//! enode://<128-hex node id>@<host>:<tcp port>[?discport=<udp port>]
//! ```
//!
//! The node id is the 64-byte uncompressed secp256k1 public key (without the
//! SEC1 `0x04` prefix). It is the stable identity of a node: two URLs for the
//! same node may differ in `discport` while still naming the same peer.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// 64-byte node identity: the uncompressed public key without its prefix byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId([u8; 64]);

impl NodeId {
    /// Create from raw bytes.
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full 128 hex chars drown log lines; show a prefix.
        write!(f, "NodeId({}…)", &hex::encode(self.0)[..8])
    }
}

/// Errors from parsing an enode URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnodeUrlError {
    /// Missing the `enode://` scheme prefix.
    #[error("missing enode:// scheme")]
    MissingScheme,
    /// The node id part is absent or not 128 hex characters.
    #[error("invalid node id in enode URL")]
    InvalidNodeId,
    /// Host/port section is malformed.
    #[error("invalid host or port in enode URL")]
    InvalidHostPort,
    /// The `discport` query parameter is malformed.
    #[error("invalid discport in enode URL")]
    InvalidDiscPort,
}

/// A parsed enode URL.
///
/// Equality compares all fields; callers interested in identity alone should
/// compare [`Node::id`], which survives `discport` churn.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    /// Stable node identity.
    pub id: NodeId,
    /// Hostname or IP literal.
    pub host: String,
    /// TCP listening port.
    pub tcp_port: u16,
    /// UDP discovery port; equals `tcp_port` unless `discport` was given.
    pub udp_port: u16,
}

impl Node {
    /// Render back to URL form. Omits `discport` when both ports agree.
    pub fn to_url(&self) -> String {
        if self.udp_port == self.tcp_port {
            format!("enode://{}@{}:{}", self.id, self.host, self.tcp_port)
        } else {
            format!(
                "enode://{}@{}:{}?discport={}",
                self.id, self.host, self.tcp_port, self.udp_port
            )
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.to_url())
    }
}

impl FromStr for Node {
    type Err = EnodeUrlError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let rest = url
            .strip_prefix("enode://")
            .ok_or(EnodeUrlError::MissingScheme)?;

        let (id_hex, addr) = rest.split_once('@').ok_or(EnodeUrlError::InvalidNodeId)?;
        if id_hex.len() != 128 {
            return Err(EnodeUrlError::InvalidNodeId);
        }
        let id_bytes = hex::decode(id_hex).map_err(|_| EnodeUrlError::InvalidNodeId)?;
        let mut id = [0u8; 64];
        id.copy_from_slice(&id_bytes);

        let (hostport, query) = match addr.split_once('?') {
            Some((hp, q)) => (hp, Some(q)),
            None => (addr, None),
        };

        let (host, port) = hostport
            .rsplit_once(':')
            .ok_or(EnodeUrlError::InvalidHostPort)?;
        if host.is_empty() {
            return Err(EnodeUrlError::InvalidHostPort);
        }
        let tcp_port: u16 = port.parse().map_err(|_| EnodeUrlError::InvalidHostPort)?;

        let udp_port = match query {
            Some(q) => {
                let v = q
                    .strip_prefix("discport=")
                    .ok_or(EnodeUrlError::InvalidDiscPort)?;
                v.parse().map_err(|_| EnodeUrlError::InvalidDiscPort)?
            }
            None => tcp_port,
        };

        Ok(Node {
            id: NodeId::new(id),
            host: host.to_string(),
            tcp_port,
            udp_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id_hex() -> String {
        "ab".repeat(64)
    }

    #[test]
    fn test_parse_round_trip() {
        let url = format!("enode://{}@10.0.0.7:30303", sample_id_hex());
        let node: Node = url.parse().unwrap();
        assert_eq!(node.host, "10.0.0.7");
        assert_eq!(node.tcp_port, 30303);
        assert_eq!(node.udp_port, 30303);
        assert_eq!(node.to_url(), url);
    }

    #[test]
    fn test_parse_discport() {
        let url = format!("enode://{}@example.net:30303?discport=30301", sample_id_hex());
        let node: Node = url.parse().unwrap();
        assert_eq!(node.udp_port, 30301);
        assert_eq!(node.to_url(), url);
    }

    #[test]
    fn test_identity_survives_discport_churn() {
        let a: Node = format!("enode://{}@h:1", sample_id_hex()).parse().unwrap();
        let b: Node = format!("enode://{}@h:1?discport=9", sample_id_hex())
            .parse()
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            "http://x".parse::<Node>().unwrap_err(),
            EnodeUrlError::MissingScheme
        );
        assert_eq!(
            format!("enode://{}", sample_id_hex())
                .parse::<Node>()
                .unwrap_err(),
            EnodeUrlError::InvalidNodeId
        );
        assert_eq!(
            "enode://abcd@h:1".parse::<Node>().unwrap_err(),
            EnodeUrlError::InvalidNodeId
        );
        assert_eq!(
            format!("enode://{}@h:notaport", sample_id_hex())
                .parse::<Node>()
                .unwrap_err(),
            EnodeUrlError::InvalidHostPort
        );
        assert_eq!(
            format!("enode://{}@h:1?discport=x", sample_id_hex())
                .parse::<Node>()
                .unwrap_err(),
            EnodeUrlError::InvalidDiscPort
        );
    }
}
