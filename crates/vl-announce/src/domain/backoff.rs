//! Per-recipient query backoff.

use std::time::Duration;

/// Backoff before re-querying a recipient that has not answered.
///
/// `min(2^min(attempts, 5) * 5, 160)` minutes, so a silent recipient is
/// chased ever more slowly up to a ~2.7h ceiling.
pub fn query_backoff(attempts: u32) -> Duration {
    let minutes = (1u64 << attempts.min(5)) * 5;
    Duration::from_secs(minutes.min(160) * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(query_backoff(1), Duration::from_secs(10 * 60));
        assert_eq!(query_backoff(2), Duration::from_secs(20 * 60));
        assert_eq!(query_backoff(3), Duration::from_secs(40 * 60));
        assert_eq!(query_backoff(4), Duration::from_secs(80 * 60));
        assert_eq!(query_backoff(5), Duration::from_secs(160 * 60));
        assert_eq!(query_backoff(6), Duration::from_secs(160 * 60));
        assert_eq!(query_backoff(u32::MAX), Duration::from_secs(160 * 60));
    }
}
