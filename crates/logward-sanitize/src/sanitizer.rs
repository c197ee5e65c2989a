//! The recursive sanitization engine.

use crate::policy::{MaskingPolicy, MaskingRule};
use logward_core::value::{marker, Value};
use logward_core::Result;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Default maximum traversal depth.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Policy-driven recursive sanitizer.
///
/// The active policy lives behind an `Arc` that is swapped atomically on
/// mutation; every traversal snapshots the pointer at entry, so in-flight
/// sanitizations observe one consistent policy. The sanitizer never
/// aborts a traversal — the depth, cycle, and access guards convert
/// every failure into an inline marker string.
pub struct Sanitizer {
    policy: RwLock<Arc<MaskingPolicy>>,
    max_depth: AtomicUsize,
}

impl Sanitizer {
    pub fn new(policy: MaskingPolicy) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy)),
            max_depth: AtomicUsize::new(DEFAULT_MAX_DEPTH),
        }
    }

    /// A sanitizer with production defaults.
    pub fn production() -> Result<Self> {
        Ok(Self::new(MaskingPolicy::production()?))
    }

    /// A sanitizer with development defaults (identity transform).
    pub fn development() -> Result<Self> {
        Ok(Self::new(MaskingPolicy::development()?))
    }

    /// Snapshot of the active policy.
    pub fn policy(&self) -> Arc<MaskingPolicy> {
        match self.policy.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the active policy atomically.
    pub fn set_policy(&self, policy: MaskingPolicy) {
        tracing::debug!(
            mode = %policy.mode(),
            enabled = policy.is_enabled(),
            strict = policy.strict_mode(),
            "masking policy replaced"
        );
        let mut guard = match self.policy.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(policy);
    }

    /// Apply a mutation to a copy of the active policy and swap it in.
    /// The active policy is untouched when the mutation fails.
    pub fn update_policy(
        &self,
        mutate: impl FnOnce(&mut MaskingPolicy) -> Result<()>,
    ) -> Result<()> {
        let mut copy = (*self.policy()).clone();
        mutate(&mut copy)?;
        self.set_policy(copy);
        Ok(())
    }

    pub fn add_rule(&self, rule: MaskingRule) -> Result<()> {
        self.update_policy(|policy| policy.add_rule(rule))
    }

    pub fn remove_rule(&self, name: &str) -> bool {
        let mut removed = false;
        let _ = self.update_policy(|policy| {
            removed = policy.remove_rule(name);
            Ok(())
        });
        removed
    }

    pub fn toggle_rule(&self, name: &str, enabled: bool) -> Result<bool> {
        let mut toggled = false;
        self.update_policy(|policy| {
            toggled = policy.toggle_rule(name, enabled)?;
            Ok(())
        })?;
        Ok(toggled)
    }

    pub fn set_max_depth(&self, depth: usize) {
        self.max_depth.store(depth, Ordering::Relaxed);
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth.load(Ordering::Relaxed)
    }

    /// Produce a structurally identical value with sensitive substrings
    /// and sensitive-field values replaced. Identity when the policy is
    /// disabled or in development mode.
    pub fn sanitize(&self, value: &Value) -> Value {
        let policy = self.policy();
        if !policy.is_active() {
            return value.clone();
        }
        let mut seen = HashSet::new();
        self.walk(&policy, value, 0, &mut seen)
    }

    /// Run string-rule sanitization over a bare string.
    pub fn sanitize_text(&self, text: &str) -> String {
        let policy = self.policy();
        if !policy.is_active() {
            return text.to_string();
        }
        policy.apply_rules(text)
    }

    /// Whether any reachable string matches an enabled rule or any
    /// reachable key name is sensitive. Detection is independent of the
    /// mode/enabled gates so strict-mode callers can probe before
    /// emitting.
    pub fn contains_pii(&self, value: &Value) -> bool {
        let policy = self.policy();
        let mut seen = HashSet::new();
        self.detect(&policy, value, 0, &mut seen)
    }

    // -- traversal ----------------------------------------------------------

    fn walk(
        &self,
        policy: &MaskingPolicy,
        value: &Value,
        depth: usize,
        seen: &mut HashSet<usize>,
    ) -> Value {
        if depth > self.max_depth() {
            return Value::String(marker::MAX_DEPTH_EXCEEDED.to_string());
        }
        match value {
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Timestamp(_)
            | Value::Pattern(_) => value.clone(),
            Value::String(s) => Value::String(policy.apply_rules(s)),
            Value::Opaque { type_name } => Value::String(format!("[{type_name}]")),
            Value::Bytes(_) => Value::String(marker::BINARY_DATA.to_string()),
            Value::Error {
                name,
                message,
                stack,
            } => Value::Error {
                name: name.clone(),
                message: policy.apply_rules(message),
                stack: stack.as_ref().map(|s| policy.apply_rules(s)),
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.walk(policy, item, depth + 1, seen))
                    .collect(),
            ),
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| {
                        (
                            self.walk(policy, key, depth + 1, seen),
                            self.walk(policy, value, depth + 1, seen),
                        )
                    })
                    .collect(),
            ),
            Value::Set(items) => {
                let mut out: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    let cleaned = self.walk(policy, item, depth + 1, seen);
                    // Duplicates collapse under post-sanitization equality.
                    if !out.contains(&cleaned) {
                        out.push(cleaned);
                    }
                }
                Value::Set(out)
            }
            Value::Object(fields) => Value::Object(self.walk_fields(policy, fields, depth, seen)),
            Value::Instance { type_name, fields } => {
                let mut out = self.walk_fields(policy, fields, depth, seen);
                out.insert("__type".to_string(), Value::String(type_name.clone()));
                Value::Object(out)
            }
            Value::Shared(shared) => {
                let addr = shared.addr();
                if !seen.insert(addr) {
                    return Value::String(marker::CIRCULAR.to_string());
                }
                let result = match shared.get() {
                    Some(inner) => self.walk(policy, &inner, depth, seen),
                    None => Value::String(marker::ACCESS_ERROR.to_string()),
                };
                seen.remove(&addr);
                result
            }
        }
    }

    fn walk_fields(
        &self,
        policy: &MaskingPolicy,
        fields: &BTreeMap<String, Value>,
        depth: usize,
        seen: &mut HashSet<usize>,
    ) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (key, value) in fields {
            if policy.is_sensitive_field(key) {
                out.insert(key.clone(), field_mask(value));
            } else {
                out.insert(key.clone(), self.walk(policy, value, depth + 1, seen));
            }
        }
        out
    }

    fn detect(
        &self,
        policy: &MaskingPolicy,
        value: &Value,
        depth: usize,
        seen: &mut HashSet<usize>,
    ) -> bool {
        if depth > self.max_depth() {
            return false;
        }
        match value {
            Value::String(s) => policy.matches_any(s),
            Value::Error { message, stack, .. } => {
                policy.matches_any(message)
                    || stack.as_ref().is_some_and(|s| policy.matches_any(s))
            }
            Value::Array(items) | Value::Set(items) => items
                .iter()
                .any(|item| self.detect(policy, item, depth + 1, seen)),
            Value::Map(entries) => entries.iter().any(|(key, value)| {
                self.detect(policy, key, depth + 1, seen)
                    || self.detect(policy, value, depth + 1, seen)
            }),
            Value::Object(fields) | Value::Instance { fields, .. } => {
                fields.iter().any(|(key, value)| {
                    policy.is_sensitive_field(key)
                        || self.detect(policy, value, depth + 1, seen)
                })
            }
            Value::Shared(shared) => {
                let addr = shared.addr();
                if !seen.insert(addr) {
                    return false;
                }
                let hit = shared
                    .get()
                    .map(|inner| self.detect(policy, &inner, depth, seen))
                    .unwrap_or(false);
                seen.remove(&addr);
                hit
            }
            _ => false,
        }
    }
}

/// Field-level mask applied to values under sensitive keys, regardless
/// of value type.
fn field_mask(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            if chars.len() <= 3 {
                Value::String("***".to_string())
            } else {
                Value::String(format!("{}***{}", chars[0], chars[chars.len() - 1]))
            }
        }
        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Null => {
            Value::String("***".to_string())
        }
        _ => Value::String("***[MASKED]***".to_string()),
    }
}
