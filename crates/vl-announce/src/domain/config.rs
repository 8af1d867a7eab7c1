//! Announce protocol timing configuration.

use std::time::Duration;

/// Cadences and cooldowns of the announce protocol.
///
/// The retry delay is derived, not configured: it must stay strictly longer
/// than the regossip cooldown other nodes impose on this node's queries, or
/// retries would be silently suppressed downstream.
#[derive(Debug, Clone)]
pub struct AnnounceConfig {
    /// How often to re-evaluate whether this node should announce.
    pub check_interval: Duration,
    /// How often to share the full signed version table with all peers.
    pub share_interval: Duration,
    /// How often to attempt an announce version bump.
    pub version_bump_interval: Duration,
    /// How often to prune announce data structures against the active set.
    pub prune_interval: Duration,
    /// How often to build a query for stale entries.
    pub query_interval: Duration,
    /// Delay between starting to announce and the first query, giving
    /// receivers time to refresh their active-set view.
    pub initial_query_delay: Duration,
    /// Minimum interval between regossips of queries from one source.
    pub query_gossip_cooldown: Duration,
    /// Minimum interval between regossips of version rows from one source.
    pub version_gossip_cooldown: Duration,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            share_interval: Duration::from_secs(5 * 60),
            version_bump_interval: Duration::from_secs(5 * 60),
            prune_interval: Duration::from_secs(10 * 60),
            query_interval: Duration::from_secs(6 * 60),
            initial_query_delay: Duration::from_secs(60),
            query_gossip_cooldown: Duration::from_secs(5 * 60),
            version_gossip_cooldown: Duration::from_secs(5 * 60),
        }
    }
}

impl AnnounceConfig {
    /// Query retry delay: the downstream cooldown plus slack.
    pub fn retry_delay(&self) -> Duration {
        self.query_gossip_cooldown + Duration::from_secs(30)
    }

    /// A config with second-scale cadences for tests.
    pub fn for_testing() -> Self {
        Self {
            check_interval: Duration::from_millis(50),
            share_interval: Duration::from_secs(2),
            version_bump_interval: Duration::from_secs(2),
            prune_interval: Duration::from_secs(4),
            query_interval: Duration::from_secs(3),
            initial_query_delay: Duration::from_millis(200),
            query_gossip_cooldown: Duration::from_secs(1),
            version_gossip_cooldown: Duration::from_secs(1),
        }
    }
}
