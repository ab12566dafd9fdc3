//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures caused by the caller's input.
/// Upstream (QuickBooks, database) failures belong to the crates that talk to
/// those systems.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A date range whose start lies after its end.
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: String, end: String },

    /// An unrecognised granularity name.
    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    /// A location tag that is empty or not configured.
    #[error("unknown location: {0}")]
    UnknownLocation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
