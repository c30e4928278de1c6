//! Error types for the notebook format layer.

use std::path::PathBuf;

/// Result type for format operations.
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors that can occur while reading or writing notebooks.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Failed to read the notebook file.
    #[error("Failed to read file {path}: {message}")]
    ReadError { path: PathBuf, message: String },

    /// Failed to write the notebook file.
    #[error("Failed to write file {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// Failed to serialize/deserialize JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid notebook structure.
    #[error("Invalid notebook: {0}")]
    InvalidNotebook(String),
}
