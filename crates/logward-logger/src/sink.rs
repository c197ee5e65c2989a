//! The pluggable record consumer.

use logward_core::{LogRecord, LogwardError, Result};
use std::io::Write;
use std::sync::Mutex;

/// Consumer of emitted records.
///
/// `accept` takes ownership of the record and must not block the caller
/// indefinitely; batching, rotation, and remote shipping are the sink's
/// concern. A sink that ships records elsewhere is responsible for its
/// own backpressure and should buffer or drop locally rather than stall
/// the emitter.
pub trait Sink: Send + Sync {
    fn accept(&self, record: LogRecord) -> Result<()>;
}

/// Default sink: one JSON object per record on standard output,
/// newline-delimited. Writes under the stdout lock, so records from one
/// task appear in program order.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink for StdoutSink {
    fn accept(&self, record: LogRecord) -> Result<()> {
        let line = serde_json::to_string(&record)?;
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{line}").map_err(|e| LogwardError::Sink(e.to_string()))
    }
}

/// Test sink accumulating records in memory.
#[derive(Debug, Default)]
pub struct CaptureSink {
    records: Mutex<Vec<LogRecord>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.lock().clone()
    }

    pub fn last(&self) -> Option<LogRecord> {
        self.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Sink for CaptureSink {
    fn accept(&self, record: LogRecord) -> Result<()> {
        self.lock().push(record);
        Ok(())
    }
}
