//! Per-IP aggregates and the bounded set they rely on.

use chrono::{DateTime, Utc};
use logward_core::AccessEvent;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Insertion-ordered, deduplicating set with a hard capacity. The
/// oldest insertion falls off silently when the cap is exceeded, which
/// keeps a scanning attacker from growing one IP's footprint without
/// bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedSet {
    items: VecDeque<String>,
    cap: usize,
}

impl BoundedSet {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::new(),
            cap,
        }
    }

    /// Insert an item; returns `false` when it was already present.
    pub fn insert(&mut self, item: &str) -> bool {
        if self.items.iter().any(|existing| existing == item) {
            return false;
        }
        if self.items.len() >= self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item.to_string());
        true
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|existing| existing == item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

/// Running aggregate for one IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpStats {
    pub ip: String,
    pub total: u64,
    pub failed: u64,
    pub success: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub endpoints: BoundedSet,
    pub user_agents: BoundedSet,
    pub user_ids: BoundedSet,
    /// Non-cumulative score in [0, 100] derived from rate and diversity
    /// contributions; recomputed on every ingest.
    pub suspicious_score: u8,
}

impl IpStats {
    pub fn new(ip: impl Into<String>, first_seen: DateTime<Utc>, per_set_cap: usize) -> Self {
        Self {
            ip: ip.into(),
            total: 0,
            failed: 0,
            success: 0,
            first_seen,
            last_seen: first_seen,
            endpoints: BoundedSet::new(per_set_cap),
            user_agents: BoundedSet::new(per_set_cap),
            user_ids: BoundedSet::new(per_set_cap),
            suspicious_score: 0,
        }
    }

    /// Fold one event into the aggregate.
    pub fn record(&mut self, event: &AccessEvent) {
        self.total += 1;
        if event.success {
            self.success += 1;
        } else {
            self.failed += 1;
        }
        if event.timestamp > self.last_seen {
            self.last_seen = event.timestamp;
        }
        if event.timestamp < self.first_seen {
            self.first_seen = event.timestamp;
        }
        self.endpoints.insert(&event.endpoint);
        if let Some(agent) = &event.user_agent {
            self.user_agents.insert(agent);
        }
        if let Some(user) = &event.user_id {
            self.user_ids.insert(user);
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.failed as f64 / self.total as f64
    }

    /// Sum of bounded contributions, clamped to [0, 100].
    pub fn recompute_score(&mut self) {
        let mut score: u32 = 0;
        let rate = self.failure_rate();
        if rate > 0.5 {
            score += 30;
        } else if rate > 0.3 {
            score += 15;
        }
        if self.user_agents.len() > 10 {
            score += 20;
        }
        if self.user_ids.len() > 5 {
            score += 25;
        }
        if self.total > 1000 {
            score += 15;
        }
        if self.endpoints.len() > 50 {
            score += 10;
        }
        self.suspicious_score = score.min(100) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ip: &str, success: bool) -> AccessEvent {
        AccessEvent::new(ip, Utc::now(), "/login", "POST", if success { 200 } else { 401 }, success)
    }

    #[test]
    fn test_bounded_set_dedup_and_order() {
        let mut set = BoundedSet::new(3);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        assert_eq!(set.len(), 2);
        assert!(set.contains("a"));
    }

    #[test]
    fn test_bounded_set_evicts_oldest_insertion() {
        let mut set = BoundedSet::new(2);
        set.insert("a");
        set.insert("b");
        set.insert("c");
        assert_eq!(set.len(), 2);
        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("c"));
    }

    #[test]
    fn test_counters_stay_consistent() {
        let mut stats = IpStats::new("1.1.1.1", Utc::now(), 256);
        for success in [true, false, false, true, true] {
            stats.record(&event("1.1.1.1", success));
        }
        assert_eq!(stats.total, 5);
        assert_eq!(stats.success, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.total, stats.failed + stats.success);
        assert!(stats.first_seen <= stats.last_seen);
    }

    #[test]
    fn test_failure_rate_contribution() {
        let mut stats = IpStats::new("1.1.1.1", Utc::now(), 256);
        for _ in 0..6 {
            stats.record(&event("1.1.1.1", false));
        }
        for _ in 0..4 {
            stats.record(&event("1.1.1.1", true));
        }
        stats.recompute_score();
        // failure rate 0.6 > 0.5 -> +30, nothing else triggers
        assert_eq!(stats.suspicious_score, 30);
    }

    #[test]
    fn test_diversity_contributions() {
        let now = Utc::now();
        let mut stats = IpStats::new("9.9.9.9", now, 256);
        for i in 0..12 {
            let e = AccessEvent::new("9.9.9.9", now, format!("/e{i}"), "GET", 200, true)
                .with_user_agent(format!("agent-{i}"))
                .with_user(format!("user-{i}"));
            stats.record(&e);
        }
        stats.recompute_score();
        // >10 agents (+20) and >5 users (+25); 12 endpoints stay under 50
        assert_eq!(stats.suspicious_score, 45);
    }

    #[test]
    fn test_score_clamped_to_100() {
        let now = Utc::now();
        let mut stats = IpStats::new("9.9.9.9", now, 256);
        for i in 0..1200 {
            let e = AccessEvent::new("9.9.9.9", now, format!("/e{i}"), "GET", 401, false)
                .with_user_agent(format!("agent-{i}"))
                .with_user(format!("user-{i}"));
            stats.record(&e);
        }
        stats.recompute_score();
        assert_eq!(stats.suspicious_score, 100);
    }

    #[test]
    fn test_per_set_caps_hold() {
        let now = Utc::now();
        let mut stats = IpStats::new("9.9.9.9", now, 16);
        for i in 0..100 {
            let e = AccessEvent::new("9.9.9.9", now, format!("/e{i}"), "GET", 200, true)
                .with_user_agent(format!("agent-{i}"));
            stats.record(&e);
        }
        assert_eq!(stats.endpoints.len(), 16);
        assert_eq!(stats.user_agents.len(), 16);
    }
}
