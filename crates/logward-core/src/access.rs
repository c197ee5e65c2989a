//! Access events and security alerts produced by the tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Severity level for security alerts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Kind of security alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "bruteForce")]
    BruteForce,
    #[serde(rename = "rateLimitExceeded")]
    RateLimitExceeded,
    #[serde(rename = "suspiciousIP")]
    SuspiciousIp,
    #[serde(rename = "geoAnomaly")]
    GeoAnomaly,
    #[serde(rename = "newIPForUser")]
    NewIpForUser,
    #[serde(rename = "multipleFailedAttempts")]
    MultipleFailedAttempts,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BruteForce => "bruteForce",
            Self::RateLimitExceeded => "rateLimitExceeded",
            Self::SuspiciousIp => "suspiciousIP",
            Self::GeoAnomaly => "geoAnomaly",
            Self::NewIpForUser => "newIPForUser",
            Self::MultipleFailedAttempts => "multipleFailedAttempts",
        };
        f.write_str(s)
    }
}

/// One request observation ingested by the tracker. Immutable once
/// constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub ip: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AccessEvent {
    pub fn new(
        ip: impl Into<String>,
        timestamp: DateTime<Utc>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
        success: bool,
    ) -> Self {
        Self {
            ip: ip.into(),
            timestamp,
            endpoint: endpoint.into(),
            method: method.into(),
            status_code,
            user_id: None,
            user_agent: None,
            success,
            reason: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A security alert produced by the tracker. The caller decides its
/// fate; `should_block` reports whether the tracker escalated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    pub should_block: bool,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        ip: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            severity,
            ip: ip.into(),
            user_id: None,
            description: description.into(),
            timestamp,
            metadata: HashMap::new(),
            should_block: false,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_should_block(mut self, should_block: bool) -> Self {
        self.should_block = should_block;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&AlertType::BruteForce).unwrap(),
            "\"bruteForce\""
        );
        assert_eq!(
            serde_json::to_string(&AlertType::SuspiciousIp).unwrap(),
            "\"suspiciousIP\""
        );
        assert_eq!(
            serde_json::to_string(&AlertType::NewIpForUser).unwrap(),
            "\"newIPForUser\""
        );
        assert_eq!(AlertType::RateLimitExceeded.to_string(), "rateLimitExceeded");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
    }

    #[test]
    fn test_event_builder() {
        let event = AccessEvent::new("1.2.3.4", Utc::now(), "/login", "POST", 401, false)
            .with_user("u1")
            .with_user_agent("curl/8.0")
            .with_reason("bad password");
        assert_eq!(event.ip, "1.2.3.4");
        assert_eq!(event.user_id.as_deref(), Some("u1"));
        assert!(!event.success);
    }

    #[test]
    fn test_alert_builder_and_serialization() {
        let alert = Alert::new(
            AlertType::BruteForce,
            AlertSeverity::High,
            "9.9.9.9",
            "Brute force: 6 failed attempts",
            Utc::now(),
        )
        .with_user("u1")
        .with_metadata("recent_failures", serde_json::json!(6))
        .with_should_block(true);

        let json: serde_json::Value = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "bruteForce");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["should_block"], true);
        assert_eq!(json["metadata"]["recent_failures"], 6);

        let back: Alert = serde_json::from_value(json).unwrap();
        assert_eq!(back.alert_type, AlertType::BruteForce);
        assert_eq!(back.id, alert.id);
    }
}
