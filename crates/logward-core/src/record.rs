//! Log levels and the sink-facing record.

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Log severity levels, from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Http,
    Debug,
    Verbose,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Http => "http",
            Self::Debug => "debug",
            Self::Verbose => "verbose",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = crate::error::LogwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "http" => Ok(Self::Http),
            "debug" => Ok(Self::Debug),
            "verbose" | "trace" => Ok(Self::Verbose),
            other => Err(crate::error::LogwardError::InvalidInput(format!(
                "unknown log level '{other}'"
            ))),
        }
    }
}

/// Metadata map attached to a record. Values are already sanitized by
/// the time a sink sees them.
pub type Metadata = BTreeMap<String, Value>;

/// One structured record, created per emit and handed once to the sink.
///
/// Field declaration order fixes the canonical NDJSON key order:
/// `timestamp, level, message, context?, trace?, metadata?`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            context: None,
            trace: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Build a [`Metadata`] map from `key => value` pairs.
///
/// ```
/// use logward_core::{metadata, Value};
///
/// let md = metadata! { "user" => "u1", "attempts" => 3 };
/// assert_eq!(md.get("attempts"), Some(&Value::Int(3)));
/// ```
#[macro_export]
macro_rules! metadata {
    () => { $crate::Metadata::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Metadata::new();
        $( map.insert(($key).to_string(), $crate::Value::from($value)); )+
        map
    }};
}
