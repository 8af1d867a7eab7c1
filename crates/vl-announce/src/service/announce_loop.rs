//! The announce loop: a single task that owns all timer state.
//!
//! Inbound handlers never block on the loop; they reach it only through the
//! capacity-1 query kick channel. External version bumps go through a
//! request/ack channel pair so callers can rely on the bump synchronously.

use std::sync::Arc;
use std::time::Duration;

use shared_types::Version;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::AnnounceService;

/// Handle to a running announce loop.
pub struct AnnounceHandle {
    bump_tx: mpsc::Sender<oneshot::Sender<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl AnnounceHandle {
    /// Bump the announce version now. Blocks until the loop has processed
    /// the bump, so callers may rely on it having happened.
    pub async fn update_announce_version(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.bump_tx.send(ack_tx).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Stop the loop and wait for it to drain.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Spawn the announce loop for `service`. `kick_rx` is the receiver returned
/// by [`AnnounceService::new`].
pub fn spawn_announce_loop(
    service: Arc<AnnounceService>,
    kick_rx: mpsc::Receiver<()>,
) -> AnnounceHandle {
    let (bump_tx, bump_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let join = tokio::spawn(run_loop(service, kick_rx, bump_rx, shutdown_rx));

    AnnounceHandle {
        bump_tx,
        shutdown_tx: Some(shutdown_tx),
        join: Some(join),
    }
}

/// Attempt a version bump to the current wall-clock second. No-ops when the
/// candidate does not advance the current version (clock regression or two
/// bumps within one second). Returns the version in force afterwards.
fn try_bump(service: &AnnounceService, current: Version) -> Version {
    // A bump may also have arrived through the inbound port; never fall
    // behind a version that has already been shared.
    let current = current.max(service.certificate_version());
    let candidate = service.now().as_secs();
    if candidate <= current {
        debug!(current, candidate, "announce version not newer, keeping current");
        return current;
    }
    match service.set_and_share_updated_version(candidate) {
        Ok(()) => candidate,
        Err(e) => {
            warn!(error = %e, "failed to update announce version");
            current
        }
    }
}

async fn run_loop(
    service: Arc<AnnounceService>,
    mut kick_rx: mpsc::Receiver<()>,
    mut bump_rx: mpsc::Receiver<oneshot::Sender<()>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let config = service.config().clone();

    // All tickers fire a full period after start, not immediately.
    let start = Instant::now();
    let mut check_ticker = interval_at(start + config.check_interval, config.check_interval);
    let mut share_ticker = interval_at(start + config.share_interval, config.share_interval);
    let mut bump_ticker = interval_at(
        start + config.version_bump_interval,
        config.version_bump_interval,
    );
    let mut prune_ticker = interval_at(start + config.prune_interval, config.prune_interval);
    let mut query_ticker = interval_at(start + config.query_interval, config.query_interval);
    for ticker in [
        &mut check_ticker,
        &mut share_ticker,
        &mut bump_ticker,
        &mut prune_ticker,
        &mut query_ticker,
    ] {
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    // One-shot timers, parked far in the future until armed.
    let far_future = || Instant::now() + Duration::from_secs(86400);
    let retry_timer = sleep_until(far_future());
    tokio::pin!(retry_timer);
    let mut retry_armed = false;
    let initial_query_timer = sleep_until(far_future());
    tokio::pin!(initial_query_timer);
    let mut initial_query_armed = false;

    let mut announcing = false;
    let mut should_announce = false;
    let mut announce_version: Version = 0;

    info!("announce loop started");

    loop {
        tokio::select! {
            _ = check_ticker.tick() => {
                trace!("checking whether this node should announce");
                should_announce = service.should_announce();

                if should_announce && !announcing {
                    announce_version = try_bump(&service, announce_version);
                    // Delay the first query so receivers have had a chance
                    // to refresh their active-set view and recognize us.
                    initial_query_timer.as_mut().reset(Instant::now() + config.initial_query_delay);
                    initial_query_armed = true;
                    announcing = true;
                    trace!("enabled periodic announce gossip");
                } else if !should_announce && announcing {
                    retry_armed = false;
                    announcing = false;
                    trace!("disabled periodic announce gossip");
                }
            }

            _ = share_ticker.tick() => {
                if let Err(e) = service.share_version_table() {
                    warn!(error = %e, "failed to share version table");
                }
            }

            _ = bump_ticker.tick() => {
                announce_version = try_bump(&service, announce_version);
            }

            _ = prune_ticker.tick() => {
                if let Err(e) = service.prune_announce_data_structures() {
                    warn!(error = %e, "failed to prune announce data structures");
                }
            }

            _ = query_ticker.tick() => {
                if announcing {
                    service.kick_query();
                }
            }

            () = &mut initial_query_timer, if initial_query_armed => {
                initial_query_armed = false;
                service.kick_query();
            }

            () = &mut retry_timer, if retry_armed => {
                retry_armed = false;
                service.kick_query();
            }

            Some(()) = kick_rx.recv() => {
                if should_announce {
                    // We may still be inside the cooldown other nodes impose
                    // on our queries; send anyway so at least direct peers
                    // process it. That matters most on a freshly started
                    // network.
                    let (has_content, result) = service.generate_and_gossip_query(announce_version);
                    if let Err(e) = result {
                        warn!(error = %e, "failed to gossip query");
                    }
                    if has_content && !retry_armed {
                        retry_timer.as_mut().reset(Instant::now() + config.retry_delay());
                        retry_armed = true;
                    }
                }
            }

            Some(ack) = bump_rx.recv() => {
                announce_version = try_bump(&service, announce_version);
                let _ = ack.send(());
            }

            _ = &mut shutdown_rx => {
                break;
            }
        }
    }

    info!("announce loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnnounceConfig;
    use crate::service::AnnounceDeps;
    use crate::testing::{FixedTimeSource, NullGossip, StaticConsensus, StaticLocalNode};
    use shared_crypto::Keypair;
    use std::collections::HashSet;
    use vl_enode_db::{InMemoryStore, ValEnodeTable, VersionTable};

    fn make_service(keypair: Keypair, active: bool) -> (Arc<AnnounceService>, mpsc::Receiver<()>) {
        let address = keypair.address();
        let mut set = HashSet::new();
        if active {
            set.insert(address);
        }
        let deps = AnnounceDeps {
            version_table: Arc::new(VersionTable::new(Box::new(InMemoryStore::new()))),
            val_enode_table: Arc::new(ValEnodeTable::new(Box::new(InMemoryStore::new()))),
            gossip: Arc::new(NullGossip),
            consensus: Arc::new(StaticConsensus::new(address, set)),
            local: Arc::new(StaticLocalNode::new(&keypair, 30303)),
            keys: Arc::new(keypair),
            time: Arc::new(FixedTimeSource::new(1_700_000_000)),
        };
        AnnounceService::new(AnnounceConfig::for_testing(), deps)
    }

    #[test]
    fn test_update_announce_version_via_inbound_port() {
        let (service, _kick_rx) = make_service(Keypair::generate(), true);
        assert!(service.retrieve_enode_certificate().is_none());

        // No loop involved: the port method alone adopts and shares.
        service.update_announce_version().unwrap();
        let first = service.certificate_version();
        assert!(first > 0);

        // Frozen clock: a second bump is a no-op.
        service.update_announce_version().unwrap();
        assert_eq!(service.certificate_version(), first);
    }

    #[tokio::test]
    async fn test_loop_starts_and_shuts_down() {
        let (service, kick_rx) = make_service(Keypair::generate(), true);
        let handle = spawn_announce_loop(service, kick_rx);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_external_bump_generates_certificate() {
        let (service, kick_rx) = make_service(Keypair::generate(), true);
        assert!(service.retrieve_enode_certificate().is_none());

        let handle = spawn_announce_loop(service.clone(), kick_rx);
        handle.update_announce_version().await;

        assert!(service.retrieve_enode_certificate().is_some());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_bump_is_monotonic_under_frozen_clock() {
        let (service, kick_rx) = make_service(Keypair::generate(), true);
        let handle = spawn_announce_loop(service.clone(), kick_rx);

        // With a frozen clock the second bump must be a no-op: same
        // wall-clock second, so no new certificate version.
        handle.update_announce_version().await;
        let first = service.certificate_version();
        handle.update_announce_version().await;
        assert_eq!(service.certificate_version(), first);

        handle.shutdown().await;
    }
}
