//! Endpoint certificates: the signed `(url, version)` handshake credential,
//! including the proxy forwarding rules.

use shared_types::Node;
use tracing::{debug, info, trace, warn};
use vl_enode_db::AddressEntryUpdate;

use crate::domain::{AnnounceError, EnodeCertificate, Message, MessageCode};
use crate::ports::Peer;

use super::{AnnounceService, CachedCertificate};

impl AnnounceService {
    /// Sign a certificate message claiming our current URL at `version`.
    pub(crate) fn generate_certificate_message(
        &self,
        version: u64,
    ) -> Result<Message, AnnounceError> {
        let certificate = EnodeCertificate {
            url: self.local_enode_url()?,
            version,
        };
        let message = Message::signed_with(
            MessageCode::EnodeCertificate,
            rlp::encode(&certificate).to_vec(),
            self.consensus.self_address(),
            |digest| self.keys.sign_digest(digest),
        )?;
        trace!(version, "generated enode certificate");
        Ok(message)
    }

    /// Install a certificate message as our handshake credential.
    pub(crate) fn set_enode_certificate(&self, message: Message) -> Result<(), AnnounceError> {
        let certificate: EnodeCertificate = rlp::decode(&message.payload)?;
        *self.certificate.lock() = Some(CachedCertificate {
            message,
            version: certificate.version,
        });
        Ok(())
    }

    /// The wire payload of the cached certificate, if any. None until the
    /// first version bump — or, on a proxy, until the proxied validator has
    /// supplied one.
    pub fn retrieve_enode_certificate(&self) -> Option<Vec<u8>> {
        self.certificate
            .lock()
            .as_ref()
            .map(|cached| cached.message.to_rlp())
    }

    pub(crate) fn certificate_version(&self) -> u64 {
        self.certificate
            .lock()
            .as_ref()
            .map(|cached| cached.version)
            .unwrap_or(0)
    }

    /// Handle an inbound certificate message from `from`.
    ///
    /// On a proxy: a certificate arriving from the proxied validator for
    /// itself, naming this proxy's node, becomes our handshake credential; a
    /// certificate from anyone else is relayed to the proxied validator
    /// without local effect — the validator echoes it back if this proxy
    /// should install it. On everything else: membership-check the sender
    /// and record the endpoint.
    pub fn handle_enode_certificate(
        &self,
        from: &dyn Peer,
        payload: &[u8],
    ) -> Result<(), AnnounceError> {
        let (message, _) = Message::from_rlp(payload)?;
        let certificate: EnodeCertificate = rlp::decode(&message.payload)?;
        let node: Node = certificate.url.parse()?;

        if self.local.is_proxy() {
            if let Some(proxied_peer) = self.local.proxied_peer() {
                if proxied_peer.node_id() == from.node_id() {
                    if Some(message.address) == self.local.proxied_validator_address() {
                        let existing = self.certificate_version();
                        if certificate.version < existing {
                            info!(
                                received = certificate.version,
                                existing, "certificate from proxied validator regresses version"
                            );
                            return Err(AnnounceError::ValidationRejected("version too low"));
                        }
                        // discport may differ between renderings of the same
                        // node, so compare identity, not the URL string.
                        if node.id != self.local.self_node().id {
                            info!(url = %certificate.url, "certificate from proxied validator names a foreign node");
                            return Err(AnnounceError::ValidationRejected("incorrect enode url"));
                        }
                        return self.set_enode_certificate(message);
                    }
                } else {
                    if let Err(e) =
                        proxied_peer.send(MessageCode::EnodeCertificate, payload.to_vec())
                    {
                        warn!(error = %e, "failed to relay certificate to proxied validator");
                    }
                    return Ok(());
                }
            }
        }

        if !self.consensus.active_set().contains(&message.address) {
            debug!(sender = %message.address, "certificate from outside the active set, ignoring");
            return Err(AnnounceError::UnauthorizedSender(message.address));
        }

        self.val_enode_table.upsert(vec![AddressEntryUpdate::endpoint(
            message.address,
            node,
            certificate.version,
        )])?;
        Ok(())
    }

    /// Bump the announce version to the current wall-clock second and share
    /// it. Callers holding only the inbound port use this; the announce loop
    /// reaches the same machinery through its bump channel. No-ops when the
    /// clock has not advanced past the version already in force, so the two
    /// paths cannot regress each other.
    pub fn update_announce_version(&self) -> Result<(), AnnounceError> {
        let candidate = self.now().as_secs();
        let current = self.certificate_version();
        if candidate <= current {
            debug!(current, candidate, "announce version not newer, keeping current");
            return Ok(());
        }
        self.set_and_share_updated_version(candidate)
    }

    /// Adopt `version` as the current announce version and share it:
    /// generate and cache a fresh certificate, hand it to our proxy if we
    /// have one, multicast it to the active set, then sign and gossip the
    /// matching version row.
    pub(crate) fn set_and_share_updated_version(&self, version: u64) -> Result<(), AnnounceError> {
        let active = self.consensus.active_set();

        let message = self.generate_certificate_message(version)?;
        self.set_enode_certificate(message.clone())?;

        if self.local.is_proxied() {
            if let Some(proxy) = self.local.proxy_peer() {
                proxy.send(MessageCode::EnodeCertificate, message.to_rlp())?;
            }
        }

        if !active.contains(&self.consensus.self_address()) {
            trace!("not in the active set, keeping new version local");
            return Ok(());
        }

        let dests: Vec<_> = active.iter().copied().collect();
        self.gossip
            .multicast(Some(&dests), message.to_rlp(), MessageCode::EnodeCertificate)?;

        let row = self.generate_signed_version(version)?;
        self.upsert_and_gossip_versions(vec![row])
    }
}
