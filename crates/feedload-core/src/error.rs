//! Error types for Feedload

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for feed loading operations
#[derive(Error, Debug)]
pub enum FeedloadError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection is not open")]
    Closed,

    /// A statement was rejected by the store. Carries the store's own diagnostic.
    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Failed to probe '{}': {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in '{}' at line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("Invalid identifier '{name}': {reason}")]
    Identifier { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedloadError {
    /// Whether this error came from the store rejecting a statement
    pub fn is_statement_error(&self) -> bool {
        matches!(self, FeedloadError::Statement(_))
    }
}

/// Result type alias for feed loading operations
pub type Result<T> = std::result::Result<T, FeedloadError>;
