//! Error types for dbtools.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for dbtools operations.
#[derive(Debug, Error)]
pub enum DbToolsError {
    /// The scan root is missing or cannot be listed.
    #[error("Search root unavailable: {path}: {message}")]
    InputUnavailable { path: PathBuf, message: String },

    /// A single source file could not be read.
    #[error("Cannot read {path}: {message}")]
    FileUnreadable { path: PathBuf, message: String },

    /// The scan was stopped through its cancel flag.
    #[error("Scan cancelled")]
    Cancelled,

    /// The database client process failed or returned an error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement not available for the selected dialect.
    #[error("Unsupported for {dialect}: {statement}")]
    Unsupported {
        dialect: &'static str,
        statement: &'static str,
    },

    /// The restore file is missing, unknown, or belongs to another database.
    #[error("Restore file error: {0}")]
    RestoreFile(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbToolsError {
    /// Create an input-unavailable error for the given root.
    pub fn input_unavailable(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::InputUnavailable {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a file-unreadable error.
    pub fn file_unreadable(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::FileUnreadable {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an unsupported-statement error.
    pub fn unsupported(dialect: &'static str, statement: &'static str) -> Self {
        Self::Unsupported { dialect, statement }
    }
}

/// Result type alias for dbtools operations.
pub type DbToolsResult<T> = Result<T, DbToolsError>;
