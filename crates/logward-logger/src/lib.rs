//! Structured JSON logging for logward
//!
//! The [`Logger`] materializes [`LogRecord`](logward_core::LogRecord)s:
//! it pulls the current trace context from the task-local carrier, runs
//! merged metadata through the sanitizer, and hands each record to a
//! pluggable [`Sink`]. The default [`StdoutSink`] writes newline-delimited
//! JSON to standard output.

pub mod emitters;
pub mod logger;
pub mod sink;

pub use logger::Logger;
pub use sink::{CaptureSink, Sink, StdoutSink};
