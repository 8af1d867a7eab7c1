//! Version share handling: the flat version-vector flood.

use tracing::{debug, trace, warn};
use vl_enode_db::{AddressEntryUpdate, SignedVersionEntry};

use crate::domain::{
    decode_version_rows, encode_version_rows, version_signing_digest, AnnounceError, MessageCode,
    VersionRow,
};
use crate::ports::Peer;

use super::AnnounceService;

impl AnnounceService {
    /// Handle an inbound version share.
    ///
    /// Rows are recovered individually; rows that fail recovery, come from
    /// outside the active set, or duplicate an earlier row in the same
    /// message are dropped without failing the rest.
    pub fn handle_version_share(&self, payload: &[u8]) -> Result<(), AnnounceError> {
        let rows = decode_version_rows(payload)?;
        trace!(rows = rows.len(), "handling version share");

        let active = self.consensus.active_set();
        let mut seen = std::collections::HashSet::new();
        let mut valid = Vec::new();

        for row in rows {
            let entry = match row.recover() {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "dropping version row with unrecoverable signature");
                    continue;
                }
            };
            if !active.contains(&entry.address) {
                debug!(address = %entry.address, "dropping version row from outside the active set");
                continue;
            }
            if !seen.insert(entry.address) {
                debug!(address = %entry.address, "dropping duplicate version row");
                continue;
            }
            valid.push(entry);
        }

        self.upsert_and_gossip_versions(valid)?;

        // Someone out there may now be known to be behind on our endpoint;
        // let the loop push it.
        self.kick_query();
        Ok(())
    }

    /// Upsert recovered version entries and regossip the ones that advanced.
    pub(crate) fn upsert_and_gossip_versions(
        &self,
        entries: Vec<SignedVersionEntry>,
    ) -> Result<(), AnnounceError> {
        // Mirror new versions into the endpoint table as staleness hints,
        // but only when this node itself participates in announcing.
        if self.should_announce() {
            let self_address = self.consensus.self_address();
            let updates: Vec<AddressEntryUpdate> = entries
                .iter()
                .filter(|entry| entry.address != self_address)
                .map(|entry| {
                    AddressEntryUpdate::version_hint(
                        entry.address,
                        entry.public_key,
                        entry.version,
                    )
                })
                .collect();
            if let Err(e) = self.val_enode_table.upsert(updates) {
                warn!(error = %e, "failed to mirror version hints into the endpoint table");
            }
        }

        let new_entries = self.version_table.upsert(entries)?;
        if new_entries.is_empty() {
            return Ok(());
        }

        // Regossip each novel row unless a row from that source went out
        // within the cooldown. Our own rows are never suppressed.
        let self_address = self.consensus.self_address();
        let now = self.now();
        let cooldown = self.config.version_gossip_cooldown.as_secs();

        let mut to_regossip = Vec::new();
        {
            let mut last_gossiped = self.last_version_gossiped.write();
            for entry in &new_entries {
                if entry.address != self_address {
                    if let Some(last) = last_gossiped.get(&entry.address) {
                        if now.saturating_since(*last) < cooldown {
                            trace!(address = %entry.address, "version regossip suppressed by cooldown");
                            continue;
                        }
                    }
                }
                to_regossip.push(VersionRow::from_entry(entry));
                last_gossiped.insert(entry.address, now);
            }
        }

        if !to_regossip.is_empty() {
            self.gossip_version_rows(&to_regossip)?;
        }
        Ok(())
    }

    /// Flood rows to all peers.
    pub(crate) fn gossip_version_rows(&self, rows: &[VersionRow]) -> Result<(), AnnounceError> {
        self.gossip
            .multicast(None, encode_version_rows(rows), MessageCode::VersionShare)
    }

    /// Dump the whole version table to all peers (periodic share). Receivers
    /// regossip only the rows that are new to them, so novelty propagates
    /// without flooding the rest.
    pub fn share_version_table(&self) -> Result<(), AnnounceError> {
        let rows: Vec<VersionRow> = self
            .version_table
            .get_all()?
            .iter()
            .map(VersionRow::from_entry)
            .collect();
        self.gossip_version_rows(&rows)
    }

    /// Push the full version table to one peer, used when a peer connects.
    pub fn send_version_table(&self, peer: &dyn Peer) -> Result<(), AnnounceError> {
        let rows: Vec<VersionRow> = self
            .version_table
            .get_all()?
            .iter()
            .map(VersionRow::from_entry)
            .collect();
        peer.send(MessageCode::VersionShare, encode_version_rows(&rows))
    }

    /// Sign a fresh version row for this validator.
    pub(crate) fn generate_signed_version(
        &self,
        version: u64,
    ) -> Result<SignedVersionEntry, AnnounceError> {
        let signature = self.keys.sign_digest(&version_signing_digest(version))?;
        Ok(SignedVersionEntry::new(
            self.keys.public_key(),
            version,
            signature,
        ))
    }
}
