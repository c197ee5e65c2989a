//! Recursive PII sanitization for logward
//!
//! This crate provides the policy-driven transformer that redacts
//! personally identifying information from arbitrary in-memory values
//! before they leave the process:
//!
//! - [`MaskingPolicy`] — ordered masking rules (built-ins then custom),
//!   sensitive-field substrings, and the mode/enabled/strict flags.
//! - [`Sanitizer`] — the depth-first traversal with cycle, depth, and
//!   access guards; never aborts, converting every failure into an
//!   inline marker string.
//! - Field helpers ([`sanitize_email`], [`sanitize_phone`],
//!   [`sanitize_credit_card`]) that operate even when whole-object
//!   sanitization is off.

pub mod fields;
pub mod policy;
pub mod sanitizer;

pub use fields::{sanitize_credit_card, sanitize_email, sanitize_phone};
pub use policy::{MaskingPolicy, MaskingRule, Mode, RulePattern};
pub use sanitizer::{Sanitizer, DEFAULT_MAX_DEPTH};
