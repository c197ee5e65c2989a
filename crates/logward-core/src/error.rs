//! Error types shared across logward crates.

/// Core error type.
#[derive(thiserror::Error, Debug)]
pub enum LogwardError {
    /// Strict mode rejected an emit whose metadata still contains PII.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Syntactically invalid caller input (e.g. a malformed IP address).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A masking rule failed to compile or conflicts with another rule.
    #[error("Policy error: {0}")]
    Policy(String),

    /// A sink implementation failed to accept a record.
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LogwardError>;
