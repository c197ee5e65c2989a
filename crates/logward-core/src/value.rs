//! The value model that sanitization and log metadata operate on.
//!
//! [`Value`] is a tagged union over every shape the sanitizer handles —
//! a dispatch table rather than an inheritance chain. Container variants
//! hold plain owned children; [`Value::Shared`] wraps a node in
//! `Arc<RwLock<_>>` so that graphs with back-references (cycles, DAGs)
//! are representable and carry a stable identity for the traversal
//! guards.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

/// Canonical marker strings substituted during sanitization and
/// serialization.
pub mod marker {
    /// A node already on the current traversal path.
    pub const CIRCULAR: &str = "[CIRCULAR]";
    /// A node below the configured maximum traversal depth.
    pub const MAX_DEPTH_EXCEEDED: &str = "[MAX_DEPTH_EXCEEDED]";
    /// A raw byte buffer.
    pub const BINARY_DATA: &str = "[Binary Data]";
    /// A shared node whose lock could not be acquired.
    pub const ACCESS_ERROR: &str = "[Error accessing property]";
}

// ---------------------------------------------------------------------------
// SharedValue
// ---------------------------------------------------------------------------

/// A shared, identity-bearing value node.
///
/// Cloning a `SharedValue` clones the handle, not the contents; two
/// clones compare equal and report the same [`addr`](Self::addr). This is
/// the only way to build a cyclic value graph.
#[derive(Debug, Clone)]
pub struct SharedValue(Arc<RwLock<Value>>);

impl SharedValue {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Stable address used as the node identity during traversal. Valid
    /// only while at least one handle is alive; traversals hold a handle
    /// for the duration, so addresses never dangle inside a visited set.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Replace the contained value.
    pub fn set(&self, value: Value) {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = value;
    }

    /// Snapshot the contained value, or `None` when the lock is
    /// unavailable (poisoned or write-held elsewhere). Child `Shared`
    /// handles are cloned shallowly.
    pub fn get(&self) -> Option<Value> {
        self.0.try_read().ok().map(|guard| guard.clone())
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// An arbitrary in-memory value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Raw byte buffer; rendered as base64 on the wire, masked by the
    /// sanitizer.
    Bytes(Vec<u8>),
    /// Passes through sanitization by value.
    Timestamp(DateTime<Utc>),
    /// A pattern (regular-expression source); passes through by value.
    Pattern(String),
    /// A value that cannot be introspected — a function, a pending
    /// future, a weak collection. The tag names the concrete type.
    Opaque { type_name: String },
    /// An error value with an optional captured stack.
    Error {
        name: String,
        message: String,
        stack: Option<String>,
    },
    /// Ordered sequence.
    Array(Vec<Value>),
    /// Plain keyed object.
    Object(BTreeMap<String, Value>),
    /// Keyed mapping whose keys are themselves values.
    Map(Vec<(Value, Value)>),
    /// Unordered set; duplicates may collapse after sanitization.
    Set(Vec<Value>),
    /// A typed instance: object fields plus the concrete type name.
    Instance {
        type_name: String,
        fields: BTreeMap<String, Value>,
    },
    /// Shared node; see [`SharedValue`].
    Shared(SharedValue),
}

impl Value {
    /// Convenience constructor for an opaque node.
    pub fn opaque(type_name: impl Into<String>) -> Self {
        Self::Opaque {
            type_name: type_name.into(),
        }
    }

    /// An opaque callable.
    pub fn function() -> Self {
        Self::opaque("Function")
    }

    /// An opaque pending future.
    pub fn promise() -> Self {
        Self::opaque("Promise")
    }

    /// An error value without a stack.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Convert a `serde_json::Value` into the logward value model.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Object(v)
    }
}

impl From<SharedValue> for Value {
    fn from(v: SharedValue) -> Self {
        Self::Shared(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serialization view carrying the per-call visited set, so cyclic
/// graphs render re-encountered nodes as [`marker::CIRCULAR`] instead of
/// recursing forever.
struct ValueSer<'a> {
    value: &'a Value,
    seen: &'a RefCell<HashSet<usize>>,
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let seen = RefCell::new(HashSet::new());
        ValueSer { value: self, seen: &seen }.serialize(serializer)
    }
}

impl Serialize for ValueSer<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => serializer.serialize_str(&BASE64_STANDARD.encode(bytes)),
            Value::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
            }
            Value::Pattern(p) => serializer.serialize_str(p),
            Value::Opaque { type_name } => serializer.serialize_str(&format!("[{type_name}]")),
            Value::Error {
                name,
                message,
                stack,
            } => {
                let len = if stack.is_some() { 3 } else { 2 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("name", name)?;
                map.serialize_entry("message", message)?;
                if let Some(stack) = stack {
                    map.serialize_entry("stack", stack)?;
                }
                map.end()
            }
            Value::Array(items) | Value::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&ValueSer {
                        value: item,
                        seen: self.seen,
                    })?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                // JSON keys must be strings, so a value-keyed map renders
                // as an array of [key, value] pairs.
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for (key, value) in entries {
                    seq.serialize_element(&(
                        ValueSer {
                            value: key,
                            seen: self.seen,
                        },
                        ValueSer {
                            value,
                            seen: self.seen,
                        },
                    ))?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(
                        key,
                        &ValueSer {
                            value,
                            seen: self.seen,
                        },
                    )?;
                }
                map.end()
            }
            Value::Instance { type_name, fields } => {
                let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
                map.serialize_entry("__type", type_name)?;
                for (key, value) in fields {
                    map.serialize_entry(
                        key,
                        &ValueSer {
                            value,
                            seen: self.seen,
                        },
                    )?;
                }
                map.end()
            }
            Value::Shared(shared) => {
                let addr = shared.addr();
                if !self.seen.borrow_mut().insert(addr) {
                    return serializer.serialize_str(marker::CIRCULAR);
                }
                let result = match shared.get() {
                    Some(inner) => ValueSer {
                        value: &inner,
                        seen: self.seen,
                    }
                    .serialize(serializer),
                    None => serializer.serialize_str(marker::ACCESS_ERROR),
                };
                self.seen.borrow_mut().remove(&addr);
                result
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(json))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
