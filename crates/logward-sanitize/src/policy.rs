//! Masking rules and the policy that orders them.

use logward_core::{LogwardError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Policy mode. Sanitization is the identity function outside
/// [`Mode::Production`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Production => "production",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = LogwardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(LogwardError::InvalidInput(format!(
                "unknown mode '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RulePattern
// ---------------------------------------------------------------------------

/// What a masking rule matches: a compiled regex (global replacement
/// semantics) or a case-insensitive literal substring.
#[derive(Debug, Clone)]
pub enum RulePattern {
    Regex(Regex),
    Literal { needle: String, regex: Regex },
}

impl RulePattern {
    /// Compile a regex pattern.
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            LogwardError::Policy(format!("failed to compile pattern '{pattern}': {e}"))
        })?;
        Ok(Self::Regex(regex))
    }

    /// Compile a case-insensitive literal substring sweep.
    pub fn literal(needle: impl Into<String>) -> Result<Self> {
        let needle = needle.into();
        let escaped = format!("(?i){}", regex::escape(&needle));
        let regex = Regex::new(&escaped).map_err(|e| {
            LogwardError::Policy(format!("failed to compile literal '{needle}': {e}"))
        })?;
        Ok(Self::Literal { needle, regex })
    }

    fn as_regex(&self) -> &Regex {
        match self {
            Self::Regex(regex) => regex,
            Self::Literal { regex, .. } => regex,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.as_regex().is_match(text)
    }

    /// Replace every match. The replacement is taken verbatim — no `$`
    /// capture expansion.
    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        self.as_regex()
            .replace_all(text, regex::NoExpand(replacement))
            .into_owned()
    }
}

// ---------------------------------------------------------------------------
// MaskingRule
// ---------------------------------------------------------------------------

/// A single named masking rule.
#[derive(Debug, Clone)]
pub struct MaskingRule {
    pub name: String,
    pub pattern: RulePattern,
    pub replacement: String,
    pub enabled: bool,
    pub description: Option<String>,
}

impl MaskingRule {
    /// A rule backed by a regex pattern.
    pub fn regex(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            pattern: RulePattern::regex(pattern)?,
            replacement: replacement.into(),
            enabled: true,
            description: None,
        })
    }

    /// A rule backed by a case-insensitive literal substring.
    pub fn literal(
        name: impl Into<String>,
        needle: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            pattern: RulePattern::literal(needle)?,
            replacement: replacement.into(),
            enabled: true,
            description: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, &self.replacement)
    }
}

// ---------------------------------------------------------------------------
// MaskingPolicy
// ---------------------------------------------------------------------------

/// Field-name substrings whose values are masked wholesale regardless of
/// content. Lowercase; matched case-insensitively against key names.
const DEFAULT_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "token",
    "apikey",
    "api_key",
    "authorization",
    "credential",
    "private_key",
    "ssn",
    "social_security",
    "credit_card",
    "card_number",
    "cvv",
    "cvc",
    "bank_account",
    "routing_number",
];

/// The ordered masking policy: built-in rules, custom rules appended
/// after them, and the sensitive-field set.
///
/// Construction compiles every pattern and verifies that no enabled
/// rule's replacement is rewritten by another enabled rule, which is
/// what makes sanitization idempotent. Mutations re-run the check and
/// are rejected when they would break it.
#[derive(Debug, Clone)]
pub struct MaskingPolicy {
    mode: Mode,
    enabled: bool,
    strict: bool,
    rules: Vec<MaskingRule>,
    custom_rules: Vec<MaskingRule>,
    sensitive_fields: Vec<String>,
}

impl MaskingPolicy {
    pub fn new(mode: Mode) -> Result<Self> {
        let policy = Self {
            mode,
            enabled: true,
            strict: false,
            rules: Self::default_rules()?,
            custom_rules: Vec::new(),
            sensitive_fields: DEFAULT_SENSITIVE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        policy.verify_non_interference()?;
        Ok(policy)
    }

    pub fn production() -> Result<Self> {
        Self::new(Mode::Production)
    }

    pub fn development() -> Result<Self> {
        Self::new(Mode::Development)
    }

    /// Build the default rule chain. Application order matters: the
    /// credit-card rule precedes the phone rule so 16-digit runs take
    /// the card replacement, and the bare digit-run rules come after
    /// every separator-aware rule.
    fn default_rules() -> Result<Vec<MaskingRule>> {
        Ok(vec![
            MaskingRule::regex(
                "email",
                r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
                "***@***.***",
            )?,
            MaskingRule::regex(
                "credit_card",
                r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b",
                "****-****-****-****",
            )?,
            MaskingRule::regex("ssn", r"\b\d{3}-\d{2}-\d{4}\b", "***-**-****")?,
            MaskingRule::regex(
                "jwt",
                r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+",
                "[JWT]",
            )?,
            MaskingRule::regex("api_key", r"[A-Za-z0-9_-]{32,}", "[API_KEY]")?,
            MaskingRule::regex(
                "phone",
                r"\b\d{3}[-.\s]\d{3}[-.\s]\d{4}\b|\(\d{3}\)\s*\d{3}[-.\s]?\d{4}\b",
                "***-***-****",
            )?,
            MaskingRule::regex("national_id", r"\b\d{9,12}\b", "***")?,
            MaskingRule::regex("bank_account", r"\b\d{10,20}\b", "***")?,
            MaskingRule::literal("password", "password", "[REDACTED]")?,
            MaskingRule::regex("ipv4", r"\b(?:\d{1,3}\.){3}\d{1,3}\b", "*.*.*.*")?
                .disabled()
                .with_description(
                    "Off by default: the access tracker needs IPs in logs and stats",
                ),
        ])
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn strict_mode(&self) -> bool {
        self.strict
    }

    pub fn set_strict_mode(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Whether sanitization transforms anything at all.
    pub fn is_active(&self) -> bool {
        self.enabled && self.mode == Mode::Production
    }

    /// All rules in application order (built-ins then custom),
    /// disabled ones included.
    pub fn all_rules(&self) -> impl Iterator<Item = &MaskingRule> {
        self.rules.iter().chain(self.custom_rules.iter())
    }

    /// Enabled rules in application order.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &MaskingRule> {
        self.all_rules().filter(|rule| rule.enabled)
    }

    pub fn rule(&self, name: &str) -> Option<&MaskingRule> {
        self.all_rules().find(|rule| rule.name == name)
    }

    /// Append a custom rule. Fails on a duplicate name or when the rule
    /// breaks replacement non-interference.
    pub fn add_rule(&mut self, rule: MaskingRule) -> Result<()> {
        if self.all_rules().any(|existing| existing.name == rule.name) {
            return Err(LogwardError::Policy(format!(
                "duplicate rule name '{}'",
                rule.name
            )));
        }
        self.custom_rules.push(rule);
        if let Err(e) = self.verify_non_interference() {
            self.custom_rules.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Remove a custom rule by name. Built-in rules can only be
    /// disabled, not removed.
    pub fn remove_rule(&mut self, name: &str) -> bool {
        let before = self.custom_rules.len();
        self.custom_rules.retain(|rule| rule.name != name);
        self.custom_rules.len() != before
    }

    /// Enable or disable a rule by name. Returns `Ok(false)` for an
    /// unknown name; enabling a rule that breaks non-interference is
    /// reverted and reported as an error.
    pub fn toggle_rule(&mut self, name: &str, enabled: bool) -> Result<bool> {
        let found = self
            .rules
            .iter_mut()
            .chain(self.custom_rules.iter_mut())
            .find(|rule| rule.name == name);
        let Some(rule) = found else {
            return Ok(false);
        };
        let previous = rule.enabled;
        rule.enabled = enabled;
        if enabled && !previous {
            if let Err(e) = self.verify_non_interference() {
                if let Some(rule) = self
                    .rules
                    .iter_mut()
                    .chain(self.custom_rules.iter_mut())
                    .find(|rule| rule.name == name)
                {
                    rule.enabled = previous;
                }
                return Err(e);
            }
        }
        Ok(true)
    }

    pub fn add_sensitive_field(&mut self, field: impl Into<String>) {
        let field = field.into().to_lowercase();
        if !self.sensitive_fields.contains(&field) {
            self.sensitive_fields.push(field);
        }
    }

    pub fn sensitive_fields(&self) -> &[String] {
        &self.sensitive_fields
    }

    /// Whether a key name marks its value as entirely maskable.
    pub fn is_sensitive_field(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.sensitive_fields
            .iter()
            .any(|field| lower.contains(field))
    }

    /// Run the full enabled rule chain over a string, left to right;
    /// later rules see the output of earlier rules.
    pub fn apply_rules(&self, text: &str) -> String {
        let mut current = text.to_string();
        for rule in self.enabled_rules() {
            if rule.matches(&current) {
                current = rule.apply(&current);
            }
        }
        current
    }

    /// Whether any enabled rule matches the string.
    pub fn matches_any(&self, text: &str) -> bool {
        self.enabled_rules().any(|rule| rule.matches(text))
    }

    /// Every enabled rule's replacement must survive the full enabled
    /// chain unchanged, otherwise repeated sanitization would keep
    /// rewriting its own output.
    fn verify_non_interference(&self) -> Result<()> {
        for rule in self.enabled_rules() {
            let swept = self.apply_rules(&rule.replacement);
            if swept != rule.replacement {
                return Err(LogwardError::Policy(format!(
                    "rule '{}': replacement '{}' is rewritten to '{}' by the rule chain",
                    rule.name, rule.replacement, swept
                )));
            }
        }
        Ok(())
    }
}
