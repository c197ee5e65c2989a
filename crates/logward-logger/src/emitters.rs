//! Specialized emitters: syntactic sugar over [`Logger::log`] with a
//! fixed severity mapping per event family. Each composes a canonical
//! message and a metadata sub-object from its structured arguments.

use crate::logger::Logger;
use logward_core::{LogLevel, Metadata, Result, Value};

fn sub(entries: Vec<(&str, Value)>) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

fn status_level(status_code: u16) -> LogLevel {
    match status_code {
        500.. => LogLevel::Error,
        400..=499 => LogLevel::Warn,
        _ => LogLevel::Http,
    }
}

impl Logger {
    // -- step lifecycle -----------------------------------------------------

    pub fn step_started(&self, step: &str) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "step".to_string(),
            sub(vec![("name", step.into()), ("status", "started".into())]),
        );
        self.log(LogLevel::Info, format!("Step started: {step}"), md)
    }

    pub fn step_progress(&self, step: &str, percent: u8) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "step".to_string(),
            sub(vec![
                ("name", step.into()),
                ("status", "in_progress".into()),
                ("percent", Value::Int(percent.min(100) as i64)),
            ]),
        );
        self.log(
            LogLevel::Debug,
            format!("Step progress: {step} ({}%)", percent.min(100)),
            md,
        )
    }

    pub fn step_completed(&self, step: &str, duration_ms: u64) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "step".to_string(),
            sub(vec![
                ("name", step.into()),
                ("status", "completed".into()),
                ("duration_ms", duration_ms.into()),
            ]),
        );
        self.log(
            LogLevel::Info,
            format!("Step completed: {step} ({duration_ms}ms)"),
            md,
        )
    }

    pub fn step_failed(&self, step: &str, error: &str) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "step".to_string(),
            sub(vec![
                ("name", step.into()),
                ("status", "failed".into()),
                ("error", error.into()),
            ]),
        );
        self.log(LogLevel::Error, format!("Step failed: {step}: {error}"), md)
    }

    // -- http ---------------------------------------------------------------

    pub fn http_request(&self, method: &str, url: &str) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "http".to_string(),
            sub(vec![("method", method.into()), ("url", url.into())]),
        );
        self.log(LogLevel::Http, format!("HTTP {method} {url}"), md)
    }

    /// 5xx responses log as errors, 4xx as warnings.
    pub fn http_response(
        &self,
        method: &str,
        url: &str,
        status_code: u16,
        duration_ms: u64,
    ) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "http".to_string(),
            sub(vec![
                ("method", method.into()),
                ("url", url.into()),
                ("status_code", (status_code as i64).into()),
                ("duration_ms", duration_ms.into()),
            ]),
        );
        self.log(
            status_level(status_code),
            format!("HTTP {method} {url} -> {status_code} ({duration_ms}ms)"),
            md,
        )
    }

    // -- retries and exceptions ---------------------------------------------

    /// The final attempt logs as an error, earlier attempts as warnings.
    pub fn retry_attempt(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        error: &str,
    ) -> Result<()> {
        let level = if attempt >= max_attempts {
            LogLevel::Error
        } else {
            LogLevel::Warn
        };
        let mut md = Metadata::new();
        md.insert(
            "retry".to_string(),
            sub(vec![
                ("operation", operation.into()),
                ("attempt", attempt.into()),
                ("max_attempts", max_attempts.into()),
                ("error", error.into()),
            ]),
        );
        self.log(
            level,
            format!("Retry {attempt}/{max_attempts} for {operation}: {error}"),
            md,
        )
    }

    /// Logs an exception with its sanitized stack in the record's
    /// `trace` field.
    pub fn exception(&self, name: &str, message: &str, stack: Option<&str>) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "exception".to_string(),
            sub(vec![("name", name.into()), ("message", message.into())]),
        );
        self.emit(
            LogLevel::Error,
            format!("Exception {name}: {message}"),
            md,
            None,
            stack.map(str::to_string),
        )
    }

    // -- webhooks and websockets --------------------------------------------

    pub fn webhook_received(&self, source: &str, event_type: &str) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "webhook".to_string(),
            sub(vec![
                ("direction", "in".into()),
                ("source", source.into()),
                ("event_type", event_type.into()),
            ]),
        );
        self.log(
            LogLevel::Info,
            format!("Webhook received from {source}: {event_type}"),
            md,
        )
    }

    pub fn webhook_sent(&self, target: &str, event_type: &str, status_code: u16) -> Result<()> {
        let level = if status_code >= 400 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        let mut md = Metadata::new();
        md.insert(
            "webhook".to_string(),
            sub(vec![
                ("direction", "out".into()),
                ("target", target.into()),
                ("event_type", event_type.into()),
                ("status_code", (status_code as i64).into()),
            ]),
        );
        self.log(
            level,
            format!("Webhook sent to {target}: {event_type} -> {status_code}"),
            md,
        )
    }

    /// `error` events log as errors, `disconnect` as warnings, the rest
    /// as debug.
    pub fn websocket_event(&self, event: &str, detail: Option<&str>) -> Result<()> {
        let level = match event {
            "error" => LogLevel::Error,
            "disconnect" => LogLevel::Warn,
            _ => LogLevel::Debug,
        };
        let mut entries = vec![("event", Value::from(event))];
        if let Some(detail) = detail {
            entries.push(("detail", detail.into()));
        }
        let mut md = Metadata::new();
        md.insert("websocket".to_string(), sub(entries));
        self.log(level, format!("WebSocket event: {event}"), md)
    }

    // -- infrastructure operations ------------------------------------------

    /// Operations at or above one second log as warnings.
    pub fn database_operation(
        &self,
        operation: &str,
        collection: &str,
        duration_ms: u64,
    ) -> Result<()> {
        let level = if duration_ms >= 1000 {
            LogLevel::Warn
        } else {
            LogLevel::Debug
        };
        let mut md = Metadata::new();
        md.insert(
            "database".to_string(),
            sub(vec![
                ("operation", operation.into()),
                ("collection", collection.into()),
                ("duration_ms", duration_ms.into()),
            ]),
        );
        self.log(
            level,
            format!("DB {operation} on {collection} ({duration_ms}ms)"),
            md,
        )
    }

    pub fn cache_operation(&self, operation: &str, key: &str, hit: bool) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "cache".to_string(),
            sub(vec![
                ("operation", operation.into()),
                ("key", key.into()),
                ("hit", hit.into()),
            ]),
        );
        let outcome = if hit { "hit" } else { "miss" };
        self.log(
            LogLevel::Debug,
            format!("Cache {operation} {key}: {outcome}"),
            md,
        )
    }

    pub fn queue_operation(
        &self,
        operation: &str,
        queue: &str,
        message_id: Option<&str>,
    ) -> Result<()> {
        let mut entries = vec![
            ("operation", Value::from(operation)),
            ("queue", Value::from(queue)),
        ];
        if let Some(id) = message_id {
            entries.push(("message_id", id.into()));
        }
        let mut md = Metadata::new();
        md.insert("queue".to_string(), sub(entries));
        self.log(
            LogLevel::Info,
            format!("Queue {operation} on {queue}"),
            md,
        )
    }

    /// Same status mapping as [`Logger::http_response`], at info for
    /// successful calls.
    pub fn external_api(
        &self,
        service: &str,
        endpoint: &str,
        status_code: u16,
        duration_ms: u64,
    ) -> Result<()> {
        let level = match status_code {
            500.. => LogLevel::Error,
            400..=499 => LogLevel::Warn,
            _ => LogLevel::Info,
        };
        let mut md = Metadata::new();
        md.insert(
            "api".to_string(),
            sub(vec![
                ("service", service.into()),
                ("endpoint", endpoint.into()),
                ("status_code", (status_code as i64).into()),
                ("duration_ms", duration_ms.into()),
            ]),
        );
        self.log(
            level,
            format!("External API {service} {endpoint} -> {status_code} ({duration_ms}ms)"),
            md,
        )
    }

    /// Failed auth events log as warnings.
    pub fn auth_event(&self, event: &str, user_id: Option<&str>, success: bool) -> Result<()> {
        let level = if success { LogLevel::Info } else { LogLevel::Warn };
        let mut entries = vec![
            ("event", Value::from(event)),
            ("success", Value::from(success)),
        ];
        if let Some(user_id) = user_id {
            entries.push(("user_id", user_id.into()));
        }
        let mut md = Metadata::new();
        md.insert("auth".to_string(), sub(entries));
        let outcome = if success { "succeeded" } else { "failed" };
        self.log(level, format!("Auth {event} {outcome}"), md)
    }

    pub fn file_operation(&self, operation: &str, path: &str, bytes: Option<u64>) -> Result<()> {
        let mut entries = vec![
            ("operation", Value::from(operation)),
            ("path", Value::from(path)),
        ];
        if let Some(bytes) = bytes {
            entries.push(("bytes", bytes.into()));
        }
        let mut md = Metadata::new();
        md.insert("file".to_string(), sub(entries));
        self.log(LogLevel::Debug, format!("File {operation}: {path}"), md)
    }

    pub fn payment_event(
        &self,
        event: &str,
        amount_cents: i64,
        currency: &str,
        status: &str,
    ) -> Result<()> {
        let mut md = Metadata::new();
        md.insert(
            "payment".to_string(),
            sub(vec![
                ("event", event.into()),
                ("amount_cents", amount_cents.into()),
                ("currency", currency.into()),
                ("status", status.into()),
            ]),
        );
        self.log(
            LogLevel::Info,
            format!("Payment {event}: {status}"),
            md,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CaptureSink, Sink};
    use logward_sanitize::Sanitizer;
    use std::sync::Arc;

    fn capture_logger() -> (Logger, Arc<CaptureSink>) {
        let sink = Arc::new(CaptureSink::new());
        let sanitizer = Arc::new(Sanitizer::production().unwrap());
        (Logger::new(sanitizer, sink.clone() as Arc<dyn Sink>), sink)
    }

    #[test]
    fn test_step_lifecycle() {
        let (logger, sink) = capture_logger();
        logger.step_started("migrate").unwrap();
        logger.step_progress("migrate", 40).unwrap();
        logger.step_completed("migrate", 1200).unwrap();
        logger.step_failed("cleanup", "lock held").unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[1].level, LogLevel::Debug);
        assert_eq!(records[3].level, LogLevel::Error);
        assert_eq!(records[3].message, "Step failed: cleanup: lock held");
    }

    #[test]
    fn test_http_response_severity_mapping() {
        let (logger, sink) = capture_logger();
        logger.http_response("GET", "/ok", 200, 12).unwrap();
        logger.http_response("GET", "/missing", 404, 8).unwrap();
        logger.http_response("POST", "/boom", 502, 30).unwrap();

        let records = sink.records();
        assert_eq!(records[0].level, LogLevel::Http);
        assert_eq!(records[1].level, LogLevel::Warn);
        assert_eq!(records[2].level, LogLevel::Error);

        let http = records[2].metadata["http"].as_object().unwrap();
        assert_eq!(http["status_code"], Value::Int(502));
        assert_eq!(http["method"], Value::from("POST"));
    }

    #[test]
    fn test_retry_severity() {
        let (logger, sink) = capture_logger();
        logger.retry_attempt("push", 1, 3, "timeout").unwrap();
        logger.retry_attempt("push", 3, 3, "timeout").unwrap();

        let records = sink.records();
        assert_eq!(records[0].level, LogLevel::Warn);
        assert_eq!(records[1].level, LogLevel::Error);
    }

    #[test]
    fn test_exception_carries_sanitized_trace() {
        let (logger, sink) = capture_logger();
        logger
            .exception("AuthError", "bad login", Some("at auth (u@e.co:10)"))
            .unwrap();
        let record = sink.last().unwrap();
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.trace.as_deref(), Some("at auth (***@***.***:10)"));
    }

    #[test]
    fn test_websocket_severity() {
        let (logger, sink) = capture_logger();
        logger.websocket_event("open", None).unwrap();
        logger.websocket_event("disconnect", Some("going away")).unwrap();
        logger.websocket_event("error", Some("broken pipe")).unwrap();

        let records = sink.records();
        assert_eq!(records[0].level, LogLevel::Debug);
        assert_eq!(records[1].level, LogLevel::Warn);
        assert_eq!(records[2].level, LogLevel::Error);
    }

    #[test]
    fn test_database_slow_query_warns() {
        let (logger, sink) = capture_logger();
        logger.database_operation("find", "users", 20).unwrap();
        logger.database_operation("aggregate", "orders", 1500).unwrap();

        let records = sink.records();
        assert_eq!(records[0].level, LogLevel::Debug);
        assert_eq!(records[1].level, LogLevel::Warn);
    }

    #[test]
    fn test_auth_event_failure_warns() {
        let (logger, sink) = capture_logger();
        logger.auth_event("login", Some("u1"), true).unwrap();
        logger.auth_event("login", Some("u1"), false).unwrap();

        let records = sink.records();
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[1].level, LogLevel::Warn);
        let auth = records[1].metadata["auth"].as_object().unwrap();
        assert_eq!(auth["success"], Value::Bool(false));
    }

    #[test]
    fn test_external_api_and_misc_emitters() {
        let (logger, sink) = capture_logger();
        logger.external_api("billing", "/charge", 503, 90).unwrap();
        logger.cache_operation("get", "user:1", true).unwrap();
        logger.queue_operation("publish", "emails", Some("m-1")).unwrap();
        logger.file_operation("write", "/tmp/out", Some(512)).unwrap();
        logger
            .payment_event("charge", 1999, "EUR", "captured")
            .unwrap();
        logger.webhook_received("stripe", "invoice.paid").unwrap();
        logger.webhook_sent("partner", "sync", 500).unwrap();
        logger.http_request("GET", "/health").unwrap();

        let records = sink.records();
        assert_eq!(records[0].level, LogLevel::Error);
        assert_eq!(records[6].level, LogLevel::Warn);
        assert_eq!(records[7].level, LogLevel::Http);
    }
}
