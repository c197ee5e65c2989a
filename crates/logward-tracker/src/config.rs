//! Tracker configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`AccessTracker`](crate::AccessTracker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Capacity of the recent-events ring; oldest events drop on
    /// overflow.
    pub ring_capacity: usize,
    /// Hard cap on live per-IP stat entries; least-recently-seen beyond
    /// this are evicted during compaction.
    pub max_ips: usize,
    /// Idle time after which a stats entry is evicted.
    pub stats_ttl_secs: u64,
    /// Per-IP cap on the endpoint/user-agent/user-id sets.
    pub per_set_cap: usize,
    /// Per-user cap on the IP history.
    pub user_history_cap: usize,
    /// Per-user cap on the observed-country set for the geo probe.
    pub user_country_cap: usize,
    /// Background compaction period.
    pub compaction_interval_secs: u64,
    /// Window for the brute-force probe.
    pub failure_window_secs: u64,
    /// Windowed failures at which a multipleFailedAttempts alert fires.
    pub failure_soft_threshold: usize,
    /// Windowed failures at which a bruteForce alert fires.
    pub failure_alert_threshold: usize,
    /// Failure count (windowed or cumulative) at which the tracker
    /// auto-blocks.
    pub failure_block_threshold: usize,
    /// Window for the rate-limit probe.
    pub rate_window_secs: u64,
    /// Windowed request count at which a rateLimitExceeded alert fires.
    pub rate_threshold: usize,
    /// Default suspicious-score threshold for reports.
    pub suspicious_threshold: u8,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 10_000,
            max_ips: 100_000,
            stats_ttl_secs: 24 * 60 * 60,
            per_set_cap: 256,
            user_history_cap: 32,
            user_country_cap: 8,
            compaction_interval_secs: 60 * 60,
            failure_window_secs: 5 * 60,
            failure_soft_threshold: 3,
            failure_alert_threshold: 5,
            failure_block_threshold: 10,
            rate_window_secs: 60,
            rate_threshold: 100,
            suspicious_threshold: 70,
        }
    }
}
