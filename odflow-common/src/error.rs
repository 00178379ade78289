//! Error types for the odflow toolkit
//!
//! Every failure the engine can report happens before any worker starts:
//! bad option combinations, missing or mis-sized inputs, out-of-range indices
//! and invalid data values. Cancellation is not an error and never shows up here.

use thiserror::Error;

/// Errors raised while validating inputs or loading configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Option combination that the engine cannot honour
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A requested output or option needs an input that was not supplied
    #[error("Missing input: {role} is required when {reason}")]
    MissingInput { role: &'static str, reason: String },

    /// Per-element input with the wrong number of elements
    #[error("Length mismatch: {role} has {actual} elements, expected {expected}")]
    LengthMismatch {
        role: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Index referring past the end of its domain
    #[error("Index out of range: {role}[{position}] = {index}, domain has {count} elements")]
    IndexOutOfRange {
        role: &'static str,
        position: usize,
        index: u64,
        count: u64,
    },

    /// Negative, NaN or otherwise unusable data value
    #[error("Illegal value in {role}[{position}]: {value} ({reason})")]
    InvalidValue {
        role: &'static str,
        position: usize,
        value: f64,
        reason: &'static str,
    },

    /// Invalid runtime configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidOptions`]
    pub fn options(msg: impl Into<String>) -> Self {
        Error::InvalidOptions(msg.into())
    }

    /// Shorthand for [`Error::MissingInput`]
    pub fn missing(role: &'static str, reason: impl Into<String>) -> Self {
        Error::MissingInput {
            role,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the values of the data rather than its shape
    pub fn is_data_error(&self) -> bool {
        matches!(self, Error::InvalidValue { .. })
    }
}

/// Result type for odflow library operations
pub type Result<T> = std::result::Result<T, Error>;
