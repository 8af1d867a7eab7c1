//! Query protocol: building, validating, answering, and regossiping the
//! per-recipient encrypted endpoint delivery.

use std::collections::HashSet;

use shared_types::{Address, Node, Version};
use tracing::{debug, trace, warn};
use vl_enode_db::{AddressEntryUpdate, QueryBookkeeping};

use crate::domain::{
    query_backoff, AnnounceError, EncryptedEnodeUrl, Message, MessageCode, QueryEnodePayload,
};
use crate::ports::PeerPurpose;

use super::AnnounceService;

impl AnnounceService {
    /// Build and multicast a query carrying our URL to every stale entry.
    ///
    /// Returns `(has_content, result)`. `has_content` is true whenever a
    /// payload was built — even if the send then failed — so the caller still
    /// arms its retry timer across transient transport errors.
    pub fn generate_and_gossip_query(&self, version: Version) -> (bool, Result<(), AnnounceError>) {
        let (message, bookkeeping) = match self.generate_query_message(version) {
            Ok(Some(built)) => built,
            Ok(None) => return (false, Ok(())),
            Err(e) => return (false, Err(e)),
        };

        if let Err(e) = self
            .gossip
            .multicast(None, message.to_rlp(), MessageCode::QueryEnode)
        {
            return (true, Err(e));
        }

        let result = self
            .val_enode_table
            .upsert(bookkeeping)
            .map_err(AnnounceError::from);
        (true, result)
    }

    /// Assemble a signed query message, or `None` when no recipient needs
    /// one. Also returns the bookkeeping upserts to commit after sending.
    fn generate_query_message(
        &self,
        version: Version,
    ) -> Result<Option<(Message, Vec<AddressEntryUpdate>)>, AnnounceError> {
        let enode_url = self.local_enode_url()?;
        let (encrypted_urls, bookkeeping) = self.generate_encrypted_urls(&enode_url)?;
        if encrypted_urls.is_empty() {
            trace!("no stale recipients, skipping query build");
            return Ok(None);
        }

        let payload = QueryEnodePayload {
            encrypted_urls,
            version,
            timestamp: self.now().as_secs(),
        };
        let message = Message::signed_with(
            MessageCode::QueryEnode,
            rlp::encode(&payload).to_vec(),
            self.consensus.self_address(),
            |digest| self.keys.sign_digest(digest),
        )?;

        debug!(
            recipients = payload.encrypted_urls.len(),
            version, "built query message"
        );
        Ok(Some((message, bookkeeping)))
    }

    /// Walk the endpoint table and seal our URL for every entry that is
    /// behind, skipping ourselves, up-to-date entries, entries we cannot
    /// encrypt to, and entries still inside their backoff window.
    ///
    /// A single seal failure aborts the whole build.
    fn generate_encrypted_urls(
        &self,
        enode_url: &str,
    ) -> Result<(Vec<EncryptedEnodeUrl>, Vec<AddressEntryUpdate>), AnnounceError> {
        let self_address = self.consensus.self_address();
        let now = self.now();

        let mut encrypted_urls = Vec::new();
        let mut bookkeeping = Vec::new();

        for (address, entry) in self.val_enode_table.get_all()? {
            if address == self_address {
                continue;
            }
            if entry.version == entry.highest_known_version {
                continue;
            }
            let Some(public_key) = entry.public_key else {
                warn!(address = %address, "stale entry has no public key, cannot query it");
                continue;
            };

            // First retry is free; from the second attempt on, wait out the
            // exponential backoff for this endpoint version.
            if entry.num_query_attempts > 1 {
                let timeout = query_backoff(entry.num_query_attempts);
                if let Some(last) = entry.last_query_timestamp {
                    if now.saturating_since(last) < timeout.as_secs() {
                        continue;
                    }
                }
            }

            let ciphertext = shared_crypto::seal(&public_key, enode_url.as_bytes())?;
            encrypted_urls.push(EncryptedEnodeUrl {
                dest_address: address,
                ciphertext,
            });
            bookkeeping.push(AddressEntryUpdate::bookkeeping(
                address,
                QueryBookkeeping {
                    for_version: entry.version,
                    num_attempts: entry.num_query_attempts + 1,
                    last_query_timestamp: now,
                },
            ));
        }

        Ok((encrypted_urls, bookkeeping))
    }

    /// Handle an inbound query message.
    pub fn handle_query_enode(&self, payload: &[u8]) -> Result<(), AnnounceError> {
        let (message, _) = Message::from_rlp(payload)?;

        let active = self.consensus.active_set();
        if !active.contains(&message.address) {
            debug!(sender = %message.address, "query from outside the active set, ignoring");
            return Err(AnnounceError::UnauthorizedSender(message.address));
        }

        let query: QueryEnodePayload = rlp::decode(&message.payload)?;
        self.validate_query(&query, active.len())?;

        if self.should_announce() {
            // Deliver the one entry addressed to us, if any. Transport-level
            // hash dedup means a repeat of this exact message never reaches
            // us twice, so answering without throttling is safe.
            for encrypted in &query.encrypted_urls {
                if encrypted.dest_address != self.consensus.self_address() {
                    continue;
                }
                let plaintext = self.keys.decrypt(&encrypted.ciphertext)?;
                let url = String::from_utf8(plaintext)
                    .map_err(|_| AnnounceError::Malformed("endpoint URL is not UTF-8".into()))?;
                let node: Node = url.parse()?;

                self.answer_query(message.address, node, query.version)?;
                break;
            }
        }

        self.regossip_query(&message.address, payload)
    }

    /// Answer a query from `address`: if the querier is already a connected
    /// peer, reply with our endpoint certificate; either way record it as a
    /// wanted consensus peer at the queried version.
    fn answer_query(
        &self,
        address: Address,
        node: Node,
        version: Version,
    ) -> Result<(), AnnounceError> {
        let peers = self.gossip.find_peers(&[node.id], PeerPurpose::Any);
        if let Some(peer) = peers.get(&node.id) {
            if let Some(certificate) = self.retrieve_enode_certificate() {
                peer.send(MessageCode::EnodeCertificate, certificate)?;
            }
        }

        self.val_enode_table
            .upsert(vec![AddressEntryUpdate::endpoint(address, node, version)])?;
        Ok(())
    }

    /// Structural checks that force queriers to stay succinct: no duplicate
    /// destinations, and at most twice the active set in size. The size
    /// bound is a heuristic against amplification — the sender's view of the
    /// set may differ slightly from ours.
    fn validate_query(
        &self,
        query: &QueryEnodePayload,
        active_set_size: usize,
    ) -> Result<(), AnnounceError> {
        let mut seen: HashSet<Address> = HashSet::with_capacity(query.encrypted_urls.len());
        for encrypted in &query.encrypted_urls {
            if !seen.insert(encrypted.dest_address) {
                return Err(AnnounceError::ValidationRejected(
                    "duplicate destination address in query",
                ));
            }
        }

        if query.encrypted_urls.len() > 2 * active_set_size {
            return Err(AnnounceError::ValidationRejected(
                "query entry count exceeds twice the active set",
            ));
        }

        Ok(())
    }

    /// Regossip a query verbatim, at most once per source per cooldown.
    fn regossip_query(&self, source: &Address, payload: &[u8]) -> Result<(), AnnounceError> {
        let now = self.now();
        let cooldown = self.config.query_gossip_cooldown.as_secs();

        {
            let last_gossiped = self.last_query_gossiped.read();
            if let Some(last) = last_gossiped.get(source) {
                if now.saturating_since(*last) < cooldown {
                    trace!(source = %source, "query regossip suppressed by cooldown");
                    return Ok(());
                }
            }
        }

        self.gossip
            .multicast(None, payload.to_vec(), MessageCode::QueryEnode)?;
        self.last_query_gossiped.write().insert(*source, now);
        Ok(())
    }
}
