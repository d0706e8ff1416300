//! Error types for report persistence and scope management.

use thiserror::Error;

/// Result type alias for Allure operations.
pub type AllureResult<T> = Result<T, AllureError>;

/// Errors that can occur while recording or persisting a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AllureError {
    /// I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error with a descriptive message.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The runner asked a scope for a phase change its lifecycle forbids.
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A step operation was used before any phase was entered.
    #[error("No active execution context")]
    NoActiveContext,

    /// A result or container was handed to the sink a second time.
    #[error("Scope already finalized: {0}")]
    AlreadyFinalized(String),

    /// Invalid attachment error.
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),
}

impl AllureError {
    pub fn configuration(message: impl Into<String>) -> Self {
        AllureError::Configuration(message.into())
    }

    pub fn invalid_attachment(message: impl Into<String>) -> Self {
        AllureError::InvalidAttachment(message.into())
    }
}
