//! Task-local trace context propagation.
//!
//! A [`TraceContext`] is a small string map bound to one logical request.
//! [`run`] binds a merged context for the lifetime of a future: awaited
//! sub-work sees the binding automatically, nested [`run`] calls extend
//! the parent map (child keys win), and concurrent tasks are fully
//! independent. Detached work (`tokio::spawn`) does not inherit the
//! binding; capture [`current`] and re-[`run`] it on the other side.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;

/// Well-known context keys.
pub mod keys {
    pub const TRACE_ID: &str = "trace_id";
    pub const SPAN_ID: &str = "span_id";
    pub const PARENT_SPAN_ID: &str = "parent_span_id";
    pub const REQUEST_ID: &str = "request_id";
    pub const USER_ID: &str = "user_id";
    pub const SESSION_ID: &str = "session_id";
    pub const CORRELATION_ID: &str = "correlation_id";
    pub const SERVICE: &str = "service";
    pub const ENVIRONMENT: &str = "environment";
    pub const VERSION: &str = "version";
}

/// Per-request metadata bag threaded through asynchronous work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext(BTreeMap<String, String>);

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merge `overlay` into this context in place; overlay keys win.
    pub fn merge(&mut self, overlay: TraceContext) {
        self.0.extend(overlay.0);
    }

    /// A new context equal to this one extended by `overlay`.
    pub fn merged(&self, overlay: TraceContext) -> TraceContext {
        let mut merged = self.clone();
        merged.merge(overlay);
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for TraceContext {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

tokio::task_local! {
    static CURRENT: RefCell<TraceContext>;
}

/// The context bound to the current task, or an empty map when unbound.
/// Never panics.
pub fn current() -> TraceContext {
    CURRENT
        .try_with(|ctx| ctx.borrow().clone())
        .unwrap_or_default()
}

/// Merge `metadata` into the currently bound context without opening a
/// new scope — for middleware that amends ids after authentication. A
/// no-op outside any scope.
pub fn set(metadata: TraceContext) {
    let _ = CURRENT.try_with(|ctx| ctx.borrow_mut().merge(metadata));
}

/// Bind `current().merged(metadata)` for the lifetime of `work`.
pub async fn run<F: Future>(metadata: TraceContext, work: F) -> F::Output {
    let merged = current().merged(metadata);
    CURRENT.scope(RefCell::new(merged), work).await
}

/// Synchronous variant of [`run`].
pub fn run_sync<T>(metadata: TraceContext, work: impl FnOnce() -> T) -> T {
    let merged = current().merged(metadata);
    CURRENT.sync_scope(RefCell::new(merged), work)
}
