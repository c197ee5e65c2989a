//! logward SDK for embedding services
//!
//! This crate re-exports the logward components and provides a small
//! builder that wires one shared [`Sanitizer`] into a [`Logger`] and
//! constructs an [`AccessTracker`]. The components stay independent
//! values — tests and embedders can instantiate as many as they need;
//! nothing here is a global singleton.

pub use logward_core::{
    context, metadata, AccessEvent, Alert, AlertSeverity, AlertType, LogLevel, LogRecord,
    LogwardError, Metadata, Result, SharedValue, TraceContext, Value,
};
pub use logward_logger::{CaptureSink, Logger, Sink, StdoutSink};
pub use logward_sanitize::{
    sanitize_credit_card, sanitize_email, sanitize_phone, MaskingPolicy, MaskingRule, Mode,
    Sanitizer,
};
pub use logward_tracker::{
    AccessTracker, AlertObserver, BoundedSet, GeoInfo, IpStats, TrackerConfig, TrackerSnapshot,
    TrackerSummary,
};

use std::sync::Arc;

/// Configuration for [`Logward::new`].
#[derive(Debug, Clone)]
pub struct LogwardConfig {
    /// Policy mode; the embedder passes this as a single string via
    /// [`Mode`]'s `FromStr` — the core never reads the process
    /// environment.
    pub mode: Mode,
    /// Convert PII detected in emit metadata into a
    /// [`LogwardError::PolicyViolation`].
    pub strict_mode: bool,
    /// Maximum sanitization depth.
    pub max_depth: usize,
    pub tracker: TrackerConfig,
}

impl Default for LogwardConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Production,
            strict_mode: false,
            max_depth: logward_sanitize::DEFAULT_MAX_DEPTH,
            tracker: TrackerConfig::default(),
        }
    }
}

/// Wired logging and security-observability core.
pub struct Logward {
    sanitizer: Arc<Sanitizer>,
    logger: Logger,
    tracker: Arc<AccessTracker>,
}

impl Logward {
    /// Build the core with the default stdout sink.
    pub fn new(config: LogwardConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(StdoutSink::new()))
    }

    /// Build the core with a custom sink.
    pub fn with_sink(config: LogwardConfig, sink: Arc<dyn Sink>) -> Result<Self> {
        let mut policy = MaskingPolicy::new(config.mode)?;
        policy.set_strict_mode(config.strict_mode);
        let sanitizer = Arc::new(Sanitizer::new(policy));
        sanitizer.set_max_depth(config.max_depth);
        let logger = Logger::new(Arc::clone(&sanitizer), sink);
        let tracker = Arc::new(AccessTracker::new(config.tracker));
        Ok(Self {
            sanitizer,
            logger,
            tracker,
        })
    }

    pub fn sanitizer(&self) -> &Arc<Sanitizer> {
        &self.sanitizer
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn tracker(&self) -> &Arc<AccessTracker> {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let core = Logward::new(LogwardConfig::default()).unwrap();
        assert!(core.sanitizer().policy().is_active());
        assert_eq!(core.tracker().config().ring_capacity, 10_000);
    }

    #[test]
    fn test_strict_mode_flag_propagates() {
        let config = LogwardConfig {
            strict_mode: true,
            ..LogwardConfig::default()
        };
        let core = Logward::new(config).unwrap();
        assert!(core.sanitizer().policy().strict_mode());
    }

    #[test]
    fn test_components_are_independent_instances() {
        let a = Logward::new(LogwardConfig::default()).unwrap();
        let b = Logward::new(LogwardConfig::default()).unwrap();
        a.tracker().block("1.2.3.4", "test").unwrap();
        assert!(!b.tracker().is_blocked("1.2.3.4"));
    }

    #[test]
    fn test_mode_from_string_input() {
        let mode: Mode = "development".parse().unwrap();
        let core = Logward::new(LogwardConfig {
            mode,
            ..LogwardConfig::default()
        })
        .unwrap();
        assert!(!core.sanitizer().policy().is_active());
    }
}
