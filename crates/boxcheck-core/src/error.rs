//! Error types for BoxCheck

use serde::Serialize;

/// Result type alias using BoxCheck's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for BoxCheck operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external vision classifier could not produce a verdict
    #[error("oracle error: {message}")]
    Oracle {
        /// Human readable cause
        message: String,
        /// Whether a retry may succeed
        transient: bool,
    },

    /// Durable storage could not complete a read or write
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Malformed candidate record or request
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller abandoned the request before the oracle answered
    #[error("request cancelled")]
    Cancelled,

    /// An oracle attempt exceeded its time budget
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    /// Create a transient oracle error (worth retrying)
    pub fn oracle_transient(msg: impl Into<String>) -> Self {
        Self::Oracle {
            message: msg.into(),
            transient: true,
        }
    }

    /// Create a permanent oracle error
    pub fn oracle_permanent(msg: impl Into<String>) -> Self {
        Self::Oracle {
            message: msg.into(),
            transient: false,
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Oracle { transient, .. } => *transient,
            Self::Timeout => true,
            _ => false,
        }
    }

    /// The signal an end user should see for this failure
    pub fn signal(&self) -> FailureSignal {
        match self {
            Self::Oracle { .. } | Self::Timeout | Self::Cancelled => FailureSignal::TryAgain,
            Self::InvalidInput(_) => FailureSignal::BadRequest,
            Self::Storage(_) | Self::Serialization(_) | Self::Config(_) => {
                FailureSignal::Unavailable
            }
        }
    }
}

/// User-visible failure categories.
///
/// None of these is ever presented as an OK/NEEDS_FIX verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSignal {
    /// Classification did not happen; the caller may retry
    TryAgain,
    /// The system could not record the result
    Unavailable,
    /// The request itself was malformed
    BadRequest,
}
