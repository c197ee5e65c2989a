//! In-memory IP reputation and abuse detection for logward
//!
//! The [`AccessTracker`] ingests per-request [`AccessEvent`]s, maintains
//! per-IP statistics under bounded memory, and emits security
//! [`Alert`]s — brute force, rate-limit breach, new IP for a user,
//! blocklist hits, and geo anomalies via an optional resolver hook —
//! with auto-block escalation. A background compaction loop enforces
//! TTL and capacity bounds.
//!
//! [`AccessEvent`]: logward_core::AccessEvent
//! [`Alert`]: logward_core::Alert

pub mod config;
pub mod snapshot;
pub mod stats;
pub mod tracker;

pub use config::TrackerConfig;
pub use snapshot::{TrackerSnapshot, SNAPSHOT_VERSION};
pub use stats::{BoundedSet, IpStats};
pub use tracker::{AccessTracker, AlertObserver, GeoInfo, TrackerSummary};
