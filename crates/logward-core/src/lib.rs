//! Core types, traits, and errors for logward
//!
//! This crate contains the foundational types shared across all logward
//! components: the [`Value`] model sanitization operates on, the
//! [`LogRecord`] handed to sinks, the task-local trace context carrier,
//! access events and security alerts, and the [`LogwardError`] error enum.

pub mod access;
pub mod context;
pub mod error;
pub mod record;
pub mod value;

pub use access::{AccessEvent, Alert, AlertSeverity, AlertType};
pub use context::TraceContext;
pub use error::{LogwardError, Result};
pub use record::{LogLevel, LogRecord, Metadata};
pub use value::{SharedValue, Value};
