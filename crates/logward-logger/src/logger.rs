//! Record construction and dispatch.

use crate::sink::{Sink, StdoutSink};
use chrono::Utc;
use logward_core::{context, LogLevel, LogRecord, LogwardError, Metadata, Result, Value};
use logward_sanitize::Sanitizer;
use std::sync::Arc;
use tracing::error;

/// Structured logger.
///
/// Every emit merges the task-local trace context under the supplied
/// metadata (caller keys win), sanitizes the result, and hands one
/// record to the sink. The only error an emit can surface is a
/// strict-mode [`LogwardError::PolicyViolation`]; sink failures degrade
/// to stderr and are swallowed.
pub struct Logger {
    sanitizer: Arc<Sanitizer>,
    sink: Arc<dyn Sink>,
    context_label: Option<String>,
}

impl Logger {
    pub fn new(sanitizer: Arc<Sanitizer>, sink: Arc<dyn Sink>) -> Self {
        Self {
            sanitizer,
            sink,
            context_label: None,
        }
    }

    /// A logger writing NDJSON to standard output.
    pub fn to_stdout(sanitizer: Arc<Sanitizer>) -> Self {
        Self::new(sanitizer, Arc::new(StdoutSink::new()))
    }

    /// A child logger sharing this logger's sanitizer and sink, with
    /// `label` as its default context label.
    pub fn with_context(&self, label: impl Into<String>) -> Self {
        Self {
            sanitizer: Arc::clone(&self.sanitizer),
            sink: Arc::clone(&self.sink),
            context_label: Some(label.into()),
        }
    }

    pub fn sanitizer(&self) -> &Arc<Sanitizer> {
        &self.sanitizer
    }

    pub fn context_label(&self) -> Option<&str> {
        self.context_label.as_deref()
    }

    /// Emit one record at the given level.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        metadata: Metadata,
    ) -> Result<()> {
        self.emit(level, message.into(), metadata, None, None)
    }

    /// Emit one record with a per-call context label, overriding the
    /// logger's default.
    pub fn log_with_context(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        metadata: Metadata,
        context: impl Into<String>,
    ) -> Result<()> {
        self.emit(level, message.into(), metadata, Some(context.into()), None)
    }

    pub fn error(&self, message: impl Into<String>, metadata: Metadata) -> Result<()> {
        self.log(LogLevel::Error, message, metadata)
    }

    pub fn warn(&self, message: impl Into<String>, metadata: Metadata) -> Result<()> {
        self.log(LogLevel::Warn, message, metadata)
    }

    pub fn info(&self, message: impl Into<String>, metadata: Metadata) -> Result<()> {
        self.log(LogLevel::Info, message, metadata)
    }

    pub fn http(&self, message: impl Into<String>, metadata: Metadata) -> Result<()> {
        self.log(LogLevel::Http, message, metadata)
    }

    pub fn debug(&self, message: impl Into<String>, metadata: Metadata) -> Result<()> {
        self.log(LogLevel::Debug, message, metadata)
    }

    pub fn verbose(&self, message: impl Into<String>, metadata: Metadata) -> Result<()> {
        self.log(LogLevel::Verbose, message, metadata)
    }

    pub(crate) fn emit(
        &self,
        level: LogLevel,
        message: String,
        metadata: Metadata,
        context: Option<String>,
        trace: Option<String>,
    ) -> Result<()> {
        let merged = self.merge_context(metadata);

        let policy = self.sanitizer.policy();
        if policy.strict_mode() && !merged.is_empty() {
            let probe = Value::Object(merged.clone());
            if self.sanitizer.contains_pii(&probe) {
                return Err(LogwardError::PolicyViolation(
                    "metadata contains unmasked PII".to_string(),
                ));
            }
        }

        let record = LogRecord {
            timestamp: Utc::now(),
            level,
            message: self.sanitizer.sanitize_text(&message),
            context: context.or_else(|| self.context_label.clone()),
            trace: trace.map(|t| self.sanitizer.sanitize_text(&t)),
            metadata: self.sanitize_metadata(merged),
        };
        self.dispatch(record);
        Ok(())
    }

    /// Trace context first, caller metadata layered over it.
    fn merge_context(&self, metadata: Metadata) -> Metadata {
        let mut merged: Metadata = context::current()
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        merged.extend(metadata);
        merged
    }

    fn sanitize_metadata(&self, merged: Metadata) -> Metadata {
        if merged.is_empty() {
            return merged;
        }
        match self.sanitizer.sanitize(&Value::Object(merged)) {
            Value::Object(fields) => fields,
            other => {
                // Only reachable with a pathological max_depth of zero.
                let mut fields = Metadata::new();
                fields.insert("metadata".to_string(), other);
                fields
            }
        }
    }

    fn dispatch(&self, record: LogRecord) {
        if let Err(e) = self.sink.accept(record.clone()) {
            error!(error = %e, "log sink failed, writing record to stderr");
            if let Ok(line) = serde_json::to_string(&record) {
                eprintln!("{line}");
            }
        }
    }
}
