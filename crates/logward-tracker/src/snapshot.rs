//! Versioned snapshot/restore of tracker state.
//!
//! The tracker is in-memory by contract; a snapshot is an optional
//! byte-buffer export an embedder may persist and later restore. The
//! structure is versioned and round-trips `ip_stats`, `blocked`,
//! `whitelisted`, `user_ip_history`, and `recent_events` with no
//! cross-field drift.

use crate::stats::IpStats;
use crate::tracker::AccessTracker;
use crate::TrackerConfig;
use logward_core::{AccessEvent, LogwardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SNAPSHOT_VERSION: u16 = 1;

/// Serialized tracker state.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub version: u16,
    pub ip_stats: Vec<IpStats>,
    pub blocked: HashMap<String, String>,
    pub whitelisted: Vec<String>,
    pub user_ip_history: HashMap<String, Vec<String>>,
    pub recent_events: Vec<AccessEvent>,
}

impl AccessTracker {
    /// Export the tracker state as a versioned byte buffer.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = TrackerSnapshot {
            version: SNAPSHOT_VERSION,
            ip_stats: self.export_stats(),
            blocked: self.export_blocked(),
            whitelisted: self.export_whitelisted(),
            user_ip_history: self.export_user_history(),
            recent_events: self.recent_events_oldest_first(),
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Rebuild a tracker from a snapshot produced by [`snapshot`](Self::snapshot).
    pub fn restore(config: TrackerConfig, bytes: &[u8]) -> Result<Self> {
        let snapshot: TrackerSnapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LogwardError::InvalidInput(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let tracker = Self::new(config);
        tracker.import(snapshot);
        Ok(tracker)
    }
}
