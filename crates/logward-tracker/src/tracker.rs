//! The access tracker: ingestion, probes, admin surface, compaction.

use crate::config::TrackerConfig;
use crate::stats::{BoundedSet, IpStats};
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use logward_core::{AccessEvent, Alert, AlertSeverity, AlertType, LogwardError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Compaction sweeps the stats map in chunks of this size so ingestion
/// can interleave between chunks.
const COMPACTION_CHUNK: usize = 1024;

/// Geo lookup result for the anomaly probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: String,
    pub region: String,
}

/// Resolver hook for the geo-anomaly probe. Must be pure and
/// non-blocking; a blocking implementation will stall ingestion.
pub type GeoResolver = dyn Fn(&str) -> Option<GeoInfo> + Send + Sync;

/// Push-model observer invoked for every alert in addition to the
/// return value of [`AccessTracker::track`], which remains the primary
/// contract.
pub trait AlertObserver: Send + Sync {
    fn on_alert(&self, alert: &Alert);
}

/// Aggregate view returned by [`AccessTracker::summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSummary {
    pub total_ips: usize,
    pub blocked_ips: usize,
    pub whitelisted_ips: usize,
    pub suspicious_ips: usize,
    pub total_requests: u64,
    pub total_events: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_event: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// In-memory per-IP access tracker.
///
/// Ingestion is pure with respect to time: windowed probes use the
/// event's own timestamp, so replayed histories produce the same
/// alerts. Compaction uses the wall clock (or an explicit instant via
/// [`compact_at`](Self::compact_at)).
pub struct AccessTracker {
    config: TrackerConfig,
    stats: DashMap<String, IpStats>,
    events: Mutex<VecDeque<AccessEvent>>,
    blocked: DashMap<String, String>,
    whitelisted: DashSet<String>,
    user_ips: DashMap<String, VecDeque<String>>,
    user_countries: DashMap<String, BoundedSet>,
    geo_resolver: RwLock<Option<Box<GeoResolver>>>,
    observer: RwLock<Option<Arc<dyn AlertObserver>>>,
}

impl std::fmt::Debug for AccessTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTracker")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("events", &self.events)
            .field("blocked", &self.blocked)
            .field("whitelisted", &self.whitelisted)
            .field("user_ips", &self.user_ips)
            .field("user_countries", &self.user_countries)
            .field("geo_resolver", &self.geo_resolver.read().map(|g| g.is_some()))
            .field("observer", &self.observer.read().map(|o| o.is_some()))
            .finish()
    }
}

impl AccessTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            stats: DashMap::new(),
            events: Mutex::new(VecDeque::new()),
            blocked: DashMap::new(),
            whitelisted: DashSet::new(),
            user_ips: DashMap::new(),
            user_countries: DashMap::new(),
            geo_resolver: RwLock::new(None),
            observer: RwLock::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TrackerConfig::default())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Install the geo resolver hook.
    pub fn set_geo_resolver(&self, resolver: Box<GeoResolver>) {
        *write_lock(&self.geo_resolver) = Some(resolver);
    }

    /// Install the push-model alert observer.
    pub fn set_observer(&self, observer: Arc<dyn AlertObserver>) {
        *write_lock(&self.observer) = Some(observer);
    }

    // -- ingestion ----------------------------------------------------------

    /// Ingest one event, update state, and return any alerts detected,
    /// in detection order. Never fails on ingestion.
    pub fn track(&self, event: AccessEvent) -> Vec<Alert> {
        // Ring append plus windowed counts in one pass under the lock.
        let (recent_failures, recent_requests) = {
            let mut ring = lock(&self.events);
            if ring.len() >= self.config.ring_capacity {
                ring.pop_front();
            }
            ring.push_back(event.clone());

            let failure_window = Duration::seconds(self.config.failure_window_secs as i64);
            let rate_window = Duration::seconds(self.config.rate_window_secs as i64);
            let mut failures = 0usize;
            let mut requests = 0usize;
            for past in ring.iter() {
                if past.ip != event.ip {
                    continue;
                }
                let age = event.timestamp.signed_duration_since(past.timestamp);
                if age < rate_window {
                    requests += 1;
                }
                if age < failure_window && !past.success {
                    failures += 1;
                }
            }
            (failures, requests)
        };

        // Stats update; the blocked-IP path below still records the event.
        let failed_total = {
            let mut entry = self
                .stats
                .entry(event.ip.clone())
                .or_insert_with(|| {
                    IpStats::new(&event.ip, event.timestamp, self.config.per_set_cap)
                });
            entry.record(&event);
            entry.recompute_score();
            entry.failed
        };

        // Per-user IP history: the new-IP probe compares against the
        // snapshot taken before this event's IP is appended.
        let prior_ips = event.user_id.as_ref().map(|user| {
            let mut history = self.user_ips.entry(user.clone()).or_default();
            let prior: Vec<String> = history.iter().cloned().collect();
            if !history.iter().any(|ip| ip == &event.ip) {
                if history.len() >= self.config.user_history_cap {
                    history.pop_front();
                }
                history.push_back(event.ip.clone());
            }
            prior
        });

        // Blocked IPs alert critically and short-circuit every probe.
        if let Some(reason) = self.blocked.get(&event.ip).map(|entry| entry.value().clone()) {
            let mut alert = Alert::new(
                AlertType::SuspiciousIp,
                AlertSeverity::Critical,
                &event.ip,
                format!("Access attempt from blocked IP {}", event.ip),
                event.timestamp,
            )
            .with_should_block(true)
            .with_metadata("block_reason", json!(reason))
            .with_metadata("endpoint", json!(event.endpoint));
            if let Some(user) = &event.user_id {
                alert = alert.with_user(user);
            }
            self.notify(&alert);
            return vec![alert];
        }

        // Whitelisted IPs are exempt from every probe.
        if self.whitelisted.contains(&event.ip) {
            return Vec::new();
        }

        let mut alerts = Vec::new();

        // Brute-force probe.
        if !event.success {
            if recent_failures >= self.config.failure_alert_threshold {
                let should_block = recent_failures >= self.config.failure_block_threshold
                    || failed_total as usize >= self.config.failure_block_threshold;
                let attempts = recent_failures.max(failed_total as usize);
                let mut alert = Alert::new(
                    AlertType::BruteForce,
                    AlertSeverity::High,
                    &event.ip,
                    format!("Brute force: {attempts} failed attempts"),
                    event.timestamp,
                )
                .with_metadata("recent_failures", json!(recent_failures))
                .with_metadata("total_failures", json!(failed_total))
                .with_metadata("window_secs", json!(self.config.failure_window_secs));
                if let Some(user) = &event.user_id {
                    alert = alert.with_user(user);
                }
                if should_block {
                    alert.should_block = true;
                    self.auto_block(&event.ip, attempts);
                }
                alerts.push(alert);
            } else if recent_failures >= self.config.failure_soft_threshold {
                let mut alert = Alert::new(
                    AlertType::MultipleFailedAttempts,
                    AlertSeverity::Medium,
                    &event.ip,
                    format!("{recent_failures} failed attempts in the last {} seconds", self.config.failure_window_secs),
                    event.timestamp,
                )
                .with_metadata("recent_failures", json!(recent_failures));
                if let Some(user) = &event.user_id {
                    alert = alert.with_user(user);
                }
                alerts.push(alert);
            }
        }

        // Rate-limit probe. Never auto-blocks.
        if recent_requests >= self.config.rate_threshold {
            alerts.push(
                Alert::new(
                    AlertType::RateLimitExceeded,
                    AlertSeverity::Medium,
                    &event.ip,
                    format!(
                        "Rate limit exceeded: {recent_requests} requests in {} seconds",
                        self.config.rate_window_secs
                    ),
                    event.timestamp,
                )
                .with_metadata("recent_requests", json!(recent_requests)),
            );
        }

        // New-IP-for-user probe.
        if event.success {
            if let (Some(user), Some(prior)) = (&event.user_id, &prior_ips) {
                if !prior.is_empty() && !prior.iter().any(|ip| ip == &event.ip) {
                    alerts.push(
                        Alert::new(
                            AlertType::NewIpForUser,
                            AlertSeverity::Low,
                            &event.ip,
                            format!("New IP for user {user}"),
                            event.timestamp,
                        )
                        .with_user(user)
                        .with_metadata("previous_ips", json!(prior)),
                    );
                }
            }
        }

        // Geo-anomaly probe; inert without a resolver.
        if let Some(user) = &event.user_id {
            if let Some(geo) = self.resolve_geo(&event.ip) {
                let mut countries = self
                    .user_countries
                    .entry(user.clone())
                    .or_insert_with(|| BoundedSet::new(self.config.user_country_cap));
                if !countries.is_empty() && !countries.contains(&geo.country) {
                    let known: Vec<String> = countries.iter().map(str::to_string).collect();
                    alerts.push(
                        Alert::new(
                            AlertType::GeoAnomaly,
                            AlertSeverity::Medium,
                            &event.ip,
                            format!("Access for user {user} from unusual country {}", geo.country),
                            event.timestamp,
                        )
                        .with_user(user)
                        .with_metadata("country", json!(geo.country))
                        .with_metadata("region", json!(geo.region))
                        .with_metadata("known_countries", json!(known)),
                    );
                }
                countries.insert(&geo.country);
            }
        }

        for alert in &alerts {
            self.notify(alert);
        }
        alerts
    }

    fn resolve_geo(&self, ip: &str) -> Option<GeoInfo> {
        read_lock(&self.geo_resolver)
            .as_ref()
            .and_then(|resolver| resolver(ip))
    }

    fn notify(&self, alert: &Alert) {
        if let Some(observer) = read_lock(&self.observer).as_ref() {
            observer.on_alert(alert);
        }
    }

    fn auto_block(&self, ip: &str, attempts: usize) {
        let reason = format!("Brute force: {attempts} failed attempts");
        info!(ip, %reason, "auto-blocking IP");
        self.blocked.insert(ip.to_string(), reason);
    }

    // -- admin surface ------------------------------------------------------

    /// Block an IP with an operator-supplied reason.
    pub fn block(&self, ip: &str, reason: impl Into<String>) -> Result<()> {
        validate_ip(ip)?;
        self.blocked.insert(ip.to_string(), reason.into());
        Ok(())
    }

    /// Unblock an IP. Returns whether it was blocked.
    pub fn unblock(&self, ip: &str) -> Result<bool> {
        validate_ip(ip)?;
        Ok(self.blocked.remove(ip).is_some())
    }

    /// Whitelist an IP; clears any prior block for it.
    pub fn whitelist(&self, ip: &str) -> Result<()> {
        validate_ip(ip)?;
        self.blocked.remove(ip);
        self.whitelisted.insert(ip.to_string());
        Ok(())
    }

    /// Remove an IP from the whitelist. Returns whether it was listed.
    pub fn unwhitelist(&self, ip: &str) -> Result<bool> {
        validate_ip(ip)?;
        Ok(self.whitelisted.remove(ip).is_some())
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.contains_key(ip)
    }

    pub fn is_whitelisted(&self, ip: &str) -> bool {
        self.whitelisted.contains(ip)
    }

    pub fn block_reason(&self, ip: &str) -> Option<String> {
        self.blocked.get(ip).map(|entry| entry.value().clone())
    }

    // -- lookups ------------------------------------------------------------

    pub fn stats(&self, ip: &str) -> Option<IpStats> {
        self.stats.get(ip).map(|entry| entry.value().clone())
    }

    /// Stats with a suspicious score at or above `threshold`, sorted by
    /// score descending.
    pub fn suspicious(&self, threshold: u8) -> Vec<IpStats> {
        let mut out: Vec<IpStats> = self
            .stats
            .iter()
            .filter(|entry| entry.suspicious_score >= threshold)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| b.suspicious_score.cmp(&a.suspicious_score));
        out
    }

    /// Most recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<AccessEvent> {
        lock(&self.events)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn events_by_ip(&self, ip: &str, limit: usize) -> Vec<AccessEvent> {
        lock(&self.events)
            .iter()
            .rev()
            .filter(|event| event.ip == ip)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn events_by_user(&self, user_id: &str, limit: usize) -> Vec<AccessEvent> {
        lock(&self.events)
            .iter()
            .rev()
            .filter(|event| event.user_id.as_deref() == Some(user_id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn user_ip_history(&self, user_id: &str) -> Vec<String> {
        self.user_ips
            .get(user_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> TrackerSummary {
        let ring = lock(&self.events);
        let total_requests: u64 = self.stats.iter().map(|entry| entry.total).sum();
        let suspicious_ips = self
            .stats
            .iter()
            .filter(|entry| entry.suspicious_score >= self.config.suspicious_threshold)
            .count();
        let memory_bytes = self.estimate_memory(&ring);
        TrackerSummary {
            total_ips: self.stats.len(),
            blocked_ips: self.blocked.len(),
            whitelisted_ips: self.whitelisted.len(),
            suspicious_ips,
            total_requests,
            total_events: ring.len(),
            oldest_event: ring.front().map(|event| event.timestamp),
            memory_bytes: Some(memory_bytes),
        }
    }

    /// Coarse footprint estimate: struct sizes plus string payloads,
    /// ignoring allocator and map overhead.
    fn estimate_memory(&self, ring: &VecDeque<AccessEvent>) -> u64 {
        let event_bytes: usize = ring
            .iter()
            .map(|event| {
                std::mem::size_of::<AccessEvent>()
                    + event.ip.len()
                    + event.endpoint.len()
                    + event.method.len()
                    + event.user_id.as_ref().map_or(0, String::len)
                    + event.user_agent.as_ref().map_or(0, String::len)
                    + event.reason.as_ref().map_or(0, String::len)
            })
            .sum();
        let stats_bytes: usize = self
            .stats
            .iter()
            .map(|entry| {
                std::mem::size_of::<IpStats>()
                    + entry.ip.len()
                    + entry.endpoints.iter().map(str::len).sum::<usize>()
                    + entry.user_agents.iter().map(str::len).sum::<usize>()
                    + entry.user_ids.iter().map(str::len).sum::<usize>()
            })
            .sum();
        (event_bytes + stats_bytes) as u64
    }

    // -- compaction ---------------------------------------------------------

    /// Run one compaction sweep against the wall clock. Idempotent.
    pub fn compact(&self) {
        self.compact_at(Utc::now());
    }

    /// Compaction core, driven by an explicit instant: TTL sweep over
    /// stats (chunked), least-recently-seen capacity eviction, ring
    /// prune, and user-history cleanup for evicted IPs. Block and
    /// whitelist entries are exempt.
    pub fn compact_at(&self, now: DateTime<Utc>) {
        let ttl = Duration::seconds(self.config.stats_ttl_secs as i64);
        let mut evicted: Vec<String> = Vec::new();

        let keys: Vec<String> = self.stats.iter().map(|entry| entry.key().clone()).collect();
        for chunk in keys.chunks(COMPACTION_CHUNK) {
            for key in chunk {
                let stale = self
                    .stats
                    .get(key)
                    .map(|entry| now.signed_duration_since(entry.last_seen) > ttl)
                    .unwrap_or(false);
                if stale && self.stats.remove(key).is_some() {
                    evicted.push(key.clone());
                }
            }
            // Keep each critical section bounded; ingestion interleaves
            // between chunks.
            std::thread::yield_now();
        }

        if self.stats.len() > self.config.max_ips {
            let mut by_age: Vec<(DateTime<Utc>, String)> = self
                .stats
                .iter()
                .map(|entry| (entry.last_seen, entry.key().clone()))
                .collect();
            by_age.sort_by_key(|(last_seen, _)| *last_seen);
            let excess = self.stats.len() - self.config.max_ips;
            for (_, key) in by_age.into_iter().take(excess) {
                if self.stats.remove(&key).is_some() {
                    evicted.push(key);
                }
            }
        }

        {
            let mut ring = lock(&self.events);
            while ring
                .front()
                .map(|event| now.signed_duration_since(event.timestamp) > ttl)
                .unwrap_or(false)
            {
                ring.pop_front();
            }
        }

        if !evicted.is_empty() {
            let evicted_set: HashSet<&str> = evicted.iter().map(String::as_str).collect();
            let users: Vec<String> = self
                .user_ips
                .iter()
                .map(|entry| entry.key().clone())
                .collect();
            for user in users {
                if let Some(mut history) = self.user_ips.get_mut(&user) {
                    history.retain(|ip| !evicted_set.contains(ip.as_str()));
                }
                self.user_ips.remove_if(&user, |_, history| history.is_empty());
            }
        }

        debug!(
            evicted = evicted.len(),
            live_ips = self.stats.len(),
            "compaction sweep complete"
        );
    }

    // -- snapshot support ---------------------------------------------------

    pub(crate) fn export_stats(&self) -> Vec<IpStats> {
        self.stats.iter().map(|entry| entry.value().clone()).collect()
    }

    pub(crate) fn export_blocked(&self) -> std::collections::HashMap<String, String> {
        self.blocked
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub(crate) fn export_whitelisted(&self) -> Vec<String> {
        self.whitelisted.iter().map(|ip| ip.key().clone()).collect()
    }

    pub(crate) fn export_user_history(&self) -> std::collections::HashMap<String, Vec<String>> {
        self.user_ips
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect()
    }

    /// Ring contents in arrival order.
    pub(crate) fn recent_events_oldest_first(&self) -> Vec<AccessEvent> {
        lock(&self.events).iter().cloned().collect()
    }

    pub(crate) fn import(&self, snapshot: crate::snapshot::TrackerSnapshot) {
        for stats in snapshot.ip_stats {
            self.stats.insert(stats.ip.clone(), stats);
        }
        for (ip, reason) in snapshot.blocked {
            self.blocked.insert(ip, reason);
        }
        for ip in snapshot.whitelisted {
            self.whitelisted.insert(ip);
        }
        for (user, ips) in snapshot.user_ip_history {
            self.user_ips.insert(user, ips.into_iter().collect());
        }
        let mut ring = lock(&self.events);
        for event in snapshot.recent_events.into_iter().take(self.config.ring_capacity) {
            ring.push_back(event);
        }
    }

    /// Spawn the background compaction loop on the current tokio
    /// runtime. Abort the returned handle to stop it.
    pub fn start_compaction(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        let period = std::time::Duration::from_secs(tracker.config.compaction_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.compact();
            }
        })
    }
}

// -- lock helpers -----------------------------------------------------------

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match rwlock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match rwlock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Admin operations reject syntactically invalid IP text; ingestion
/// never validates.
fn validate_ip(ip: &str) -> Result<()> {
    ip.parse::<IpAddr>().map(|_| ()).map_err(|_| {
        warn!(ip, "rejecting admin operation on invalid IP");
        LogwardError::InvalidInput(format!("not an IP address: '{ip}'"))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn failure(ip: &str, at: DateTime<Utc>) -> AccessEvent {
        AccessEvent::new(ip, at, "/login", "POST", 401, false)
    }

    fn success(ip: &str, at: DateTime<Utc>) -> AccessEvent {
        AccessEvent::new(ip, at, "/login", "POST", 200, true)
    }

    #[test]
    fn test_track_updates_stats() {
        let tracker = AccessTracker::with_defaults();
        tracker.track(success("1.1.1.1", t0()));
        tracker.track(failure("1.1.1.1", t0() + Duration::seconds(1)));

        let stats = tracker.stats("1.1.1.1").unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.failed, 1);
        assert!(tracker.stats("2.2.2.2").is_none());
    }

    #[test]
    fn test_brute_force_thresholds_minute_apart() {
        let tracker = AccessTracker::with_defaults();
        let ip = "6.6.6.6";

        // Events 1-9, one minute apart: bruteForce/high from the 5th on,
        // but no block yet.
        for i in 0..9 {
            let alerts = tracker.track(failure(ip, t0() + Duration::minutes(i)));
            if i + 1 >= 5 {
                assert!(
                    alerts
                        .iter()
                        .any(|a| a.alert_type == AlertType::BruteForce
                            && a.severity == AlertSeverity::High),
                    "event {} should raise bruteForce",
                    i + 1
                );
            }
            assert!(!tracker.is_blocked(ip), "no block before the 10th failure");
        }

        // The 10th failure blocks on the cumulative counter.
        let alerts = tracker.track(failure(ip, t0() + Duration::minutes(9)));
        let brute = alerts
            .iter()
            .find(|a| a.alert_type == AlertType::BruteForce)
            .expect("10th failure raises bruteForce");
        assert!(brute.should_block);
        assert!(tracker.is_blocked(ip));
        assert_eq!(
            tracker.block_reason(ip).unwrap(),
            "Brute force: 10 failed attempts"
        );
    }

    #[test]
    fn test_brute_force_burst_blocks_on_windowed_count() {
        let tracker = AccessTracker::with_defaults();
        let ip = "6.6.6.7";
        for i in 0..10 {
            let alerts = tracker.track(failure(ip, t0() + Duration::seconds(i)));
            if i + 1 == 10 {
                assert!(alerts.iter().any(|a| a.should_block));
            }
        }
        assert!(tracker.is_blocked(ip));
    }

    #[test]
    fn test_multiple_failed_attempts_on_ramp() {
        let tracker = AccessTracker::with_defaults();
        let ip = "6.6.6.8";
        tracker.track(failure(ip, t0()));
        tracker.track(failure(ip, t0() + Duration::seconds(1)));
        let alerts = tracker.track(failure(ip, t0() + Duration::seconds(2)));
        assert!(alerts
            .iter()
            .any(|a| a.alert_type == AlertType::MultipleFailedAttempts
                && a.severity == AlertSeverity::Medium));
        assert!(!alerts.iter().any(|a| a.alert_type == AlertType::BruteForce));
    }

    #[test]
    fn test_rate_limit_threshold() {
        let tracker = AccessTracker::with_defaults();
        let ip = "7.7.7.7";
        let mut last = Vec::new();
        for i in 0..100 {
            // 100 events inside a 30-second window.
            let at = t0() + Duration::milliseconds(i * 300);
            last = tracker.track(success(ip, at));
        }
        assert!(last
            .iter()
            .any(|a| a.alert_type == AlertType::RateLimitExceeded
                && a.severity == AlertSeverity::Medium));
        assert!(!tracker.is_blocked(ip), "rate limiting never auto-blocks");
    }

    #[test]
    fn test_rate_limit_not_triggered_when_spread_out() {
        let tracker = AccessTracker::with_defaults();
        let ip = "7.7.7.8";
        for i in 0..100 {
            let alerts = tracker.track(success(ip, t0() + Duration::seconds(i * 2)));
            assert!(alerts.is_empty(), "spread-out traffic should not alert");
        }
    }

    #[test]
    fn test_new_ip_for_user() {
        let tracker = AccessTracker::with_defaults();
        let first = tracker.track(success("1.1.1.1", t0()).with_user("u1"));
        assert!(first.is_empty(), "first IP for a user is not an anomaly");

        let second = tracker.track(
            success("2.2.2.2", t0() + Duration::minutes(1)).with_user("u1"),
        );
        let alert = second
            .iter()
            .find(|a| a.alert_type == AlertType::NewIpForUser)
            .expect("second IP raises newIPForUser");
        assert_eq!(alert.severity, AlertSeverity::Low);
        assert_eq!(alert.user_id.as_deref(), Some("u1"));
        let previous = alert.metadata["previous_ips"].as_array().unwrap();
        assert!(previous.iter().any(|ip| ip == "1.1.1.1"));

        // Same IP again: history now contains it, no alert.
        let third = tracker.track(
            success("2.2.2.2", t0() + Duration::minutes(2)).with_user("u1"),
        );
        assert!(third.is_empty());
    }

    #[test]
    fn test_failed_events_do_not_raise_new_ip() {
        let tracker = AccessTracker::with_defaults();
        tracker.track(success("1.1.1.1", t0()).with_user("u1"));
        let alerts = tracker.track(
            failure("3.3.3.3", t0() + Duration::minutes(1)).with_user("u1"),
        );
        assert!(!alerts.iter().any(|a| a.alert_type == AlertType::NewIpForUser));
    }

    #[test]
    fn test_blocked_ip_alerts_critically_and_short_circuits() {
        let tracker = AccessTracker::with_defaults();
        tracker.block("5.5.5.5", "manual").unwrap();

        let alerts = tracker.track(failure("5.5.5.5", t0()));
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.alert_type, AlertType::SuspiciousIp);
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(alert.should_block);
        assert_eq!(alert.metadata["block_reason"], "manual");

        // The event is still recorded.
        assert_eq!(tracker.stats("5.5.5.5").unwrap().total, 1);
    }

    #[test]
    fn test_whitelist_suppresses_alerts_and_clears_block() {
        let tracker = AccessTracker::with_defaults();
        tracker.block("8.8.8.8", "oops").unwrap();
        tracker.whitelist("8.8.8.8").unwrap();
        assert!(!tracker.is_blocked("8.8.8.8"));
        assert!(tracker.is_whitelisted("8.8.8.8"));

        for i in 0..20 {
            let alerts = tracker.track(failure("8.8.8.8", t0() + Duration::seconds(i)));
            assert!(alerts.is_empty(), "whitelisted IPs never alert");
        }
        assert!(!tracker.is_blocked("8.8.8.8"));
    }

    #[test]
    fn test_block_sticky_until_unblock() {
        let tracker = AccessTracker::with_defaults();
        tracker.block("4.4.4.4", "abuse").unwrap();
        assert!(tracker.is_blocked("4.4.4.4"));
        tracker.track(success("4.4.4.4", t0()));
        assert!(tracker.is_blocked("4.4.4.4"));
        assert!(tracker.unblock("4.4.4.4").unwrap());
        assert!(!tracker.is_blocked("4.4.4.4"));
    }

    #[test]
    fn test_admin_ops_reject_garbage_ip() {
        let tracker = AccessTracker::with_defaults();
        for garbage in ["", "not-an-ip", "999.1.2.3.4"] {
            assert!(matches!(
                tracker.block(garbage, "x").unwrap_err(),
                LogwardError::InvalidInput(_)
            ));
            assert!(tracker.whitelist(garbage).is_err());
            assert!(tracker.unblock(garbage).is_err());
        }
        // IPv6 is accepted.
        tracker.block("::1", "local").unwrap();
        assert!(tracker.is_blocked("::1"));
    }

    #[test]
    fn test_track_accepts_any_ip_text() {
        let tracker = AccessTracker::with_defaults();
        let alerts = tracker.track(success("weird-host-name", t0()));
        assert!(alerts.is_empty());
        assert!(tracker.stats("weird-host-name").is_some());
    }

    #[test]
    fn test_ring_capacity_bounded() {
        let config = TrackerConfig {
            ring_capacity: 16,
            ..TrackerConfig::default()
        };
        let tracker = AccessTracker::new(config);
        for i in 0..100 {
            tracker.track(success("1.2.3.4", t0() + Duration::seconds(i)));
        }
        assert_eq!(tracker.recent_events(1000).len(), 16);
    }

    #[test]
    fn test_event_lookups() {
        let tracker = AccessTracker::with_defaults();
        tracker.track(success("1.1.1.1", t0()).with_user("u1"));
        tracker.track(success("2.2.2.2", t0() + Duration::seconds(1)).with_user("u2"));
        tracker.track(success("1.1.1.1", t0() + Duration::seconds(2)).with_user("u1"));

        assert_eq!(tracker.events_by_ip("1.1.1.1", 10).len(), 2);
        assert_eq!(tracker.events_by_user("u2", 10).len(), 1);
        let recent = tracker.recent_events(2);
        assert_eq!(recent.len(), 2);
        // Newest first.
        assert_eq!(recent[0].ip, "1.1.1.1");
        assert_eq!(recent[1].ip, "2.2.2.2");
    }

    #[test]
    fn test_suspicious_sorted_desc() {
        let tracker = AccessTracker::with_defaults();
        // High failure rate on one IP.
        for i in 0..4 {
            tracker.track(failure("9.0.0.1", t0() + Duration::minutes(i * 10)));
        }
        // Mild failure rate on another.
        tracker.track(failure("9.0.0.2", t0()));
        tracker.track(success("9.0.0.2", t0() + Duration::seconds(1)));
        tracker.track(success("9.0.0.2", t0() + Duration::seconds(2)));

        let suspicious = tracker.suspicious(10);
        assert!(!suspicious.is_empty());
        for pair in suspicious.windows(2) {
            assert!(pair[0].suspicious_score >= pair[1].suspicious_score);
        }
        assert_eq!(suspicious[0].ip, "9.0.0.1");
    }

    #[test]
    fn test_summary_counts() {
        let tracker = AccessTracker::with_defaults();
        tracker.track(success("1.1.1.1", t0()));
        tracker.track(success("2.2.2.2", t0() + Duration::seconds(1)));
        tracker.block("3.3.3.3", "manual").unwrap();
        tracker.whitelist("4.4.4.4").unwrap();

        let summary = tracker.summary();
        assert_eq!(summary.total_ips, 2);
        assert_eq!(summary.blocked_ips, 1);
        assert_eq!(summary.whitelisted_ips, 1);
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.total_events, 2);
        assert_eq!(summary.oldest_event, Some(t0()));
        assert!(summary.memory_bytes.unwrap() > 0);
    }

    #[test]
    fn test_compaction_ttl_eviction() {
        let tracker = AccessTracker::with_defaults();
        tracker.track(success("1.1.1.1", t0()).with_user("u1"));
        tracker.track(success("2.2.2.2", t0() + Duration::hours(30)));

        tracker.compact_at(t0() + Duration::hours(30));
        assert!(tracker.stats("1.1.1.1").is_none(), "stale entry evicted");
        assert!(tracker.stats("2.2.2.2").is_some(), "fresh entry kept");
        // The evicted IP also left the user history.
        assert!(tracker.user_ip_history("u1").is_empty());
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let tracker = AccessTracker::with_defaults();
        tracker.track(success("1.1.1.1", t0()));
        tracker.compact_at(t0() + Duration::hours(30));
        tracker.compact_at(t0() + Duration::hours(30));
        assert!(tracker.stats("1.1.1.1").is_none());
        assert_eq!(tracker.recent_events(10).len(), 0);
    }

    #[test]
    fn test_compaction_capacity_eviction_drops_lru() {
        let config = TrackerConfig {
            max_ips: 3,
            ..TrackerConfig::default()
        };
        let tracker = AccessTracker::new(config);
        for i in 0..5 {
            tracker.track(success(&format!("10.0.0.{i}"), t0() + Duration::seconds(i)));
        }
        tracker.compact_at(t0() + Duration::seconds(10));
        assert_eq!(tracker.summary().total_ips, 3);
        // The two least-recently-seen IPs were evicted.
        assert!(tracker.stats("10.0.0.0").is_none());
        assert!(tracker.stats("10.0.0.1").is_none());
        assert!(tracker.stats("10.0.0.4").is_some());
    }

    #[test]
    fn test_compaction_leaves_lists_intact() {
        let tracker = AccessTracker::with_defaults();
        tracker.block("3.3.3.3", "manual").unwrap();
        tracker.whitelist("4.4.4.4").unwrap();
        tracker.compact_at(t0() + Duration::days(365));
        assert!(tracker.is_blocked("3.3.3.3"));
        assert!(tracker.is_whitelisted("4.4.4.4"));
    }

    #[test]
    fn test_geo_anomaly_probe() {
        let tracker = AccessTracker::with_defaults();
        tracker.set_geo_resolver(Box::new(|ip: &str| {
            let country = if ip.starts_with("1.") { "DE" } else { "BR" };
            Some(GeoInfo {
                country: country.to_string(),
                region: "x".to_string(),
            })
        }));

        let first = tracker.track(success("1.1.1.1", t0()).with_user("u1"));
        assert!(!first.iter().any(|a| a.alert_type == AlertType::GeoAnomaly));

        let second = tracker.track(
            success("1.1.1.2", t0() + Duration::minutes(1)).with_user("u1"),
        );
        assert!(
            !second.iter().any(|a| a.alert_type == AlertType::GeoAnomaly),
            "same country is not an anomaly"
        );

        let third = tracker.track(
            success("200.1.1.1", t0() + Duration::minutes(2)).with_user("u1"),
        );
        let alert = third
            .iter()
            .find(|a| a.alert_type == AlertType::GeoAnomaly)
            .expect("country change raises geoAnomaly");
        assert_eq!(alert.severity, AlertSeverity::Medium);
        assert_eq!(alert.metadata["country"], "BR");
    }

    #[test]
    fn test_no_geo_alert_without_resolver() {
        let tracker = AccessTracker::with_defaults();
        tracker.track(success("1.1.1.1", t0()).with_user("u1"));
        let alerts = tracker.track(
            success("200.1.1.1", t0() + Duration::minutes(1)).with_user("u1"),
        );
        assert!(!alerts.iter().any(|a| a.alert_type == AlertType::GeoAnomaly));
    }

    #[test]
    fn test_observer_receives_alerts() {
        struct Counter(AtomicUsize);
        impl AlertObserver for Counter {
            fn on_alert(&self, _alert: &Alert) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let tracker = AccessTracker::with_defaults();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        tracker.set_observer(counter.clone());

        for i in 0..5 {
            tracker.track(failure("9.9.9.9", t0() + Duration::seconds(i)));
        }
        assert!(counter.0.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_background_compaction_runs() {
        tokio::time::pause();
        let config = TrackerConfig {
            compaction_interval_secs: 1,
            stats_ttl_secs: 1,
            ..TrackerConfig::default()
        };
        let tracker = Arc::new(AccessTracker::new(config));
        tracker.track(success("1.1.1.1", Utc::now() - Duration::hours(1)));
        let handle = tracker.start_compaction();

        // Let a few virtual ticks elapse.
        for _ in 0..3 {
            tokio::time::advance(std::time::Duration::from_secs(2)).await;
            tokio::task::yield_now().await;
        }

        assert!(tracker.stats("1.1.1.1").is_none());
        handle.abort();
    }
}
