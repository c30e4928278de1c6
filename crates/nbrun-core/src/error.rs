//! Error types for nbrun-core.

use thiserror::Error;

/// Result type for nbrun-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a kernel.
#[derive(Debug, Error)]
pub enum Error {
    /// A display payload used a media type with no document attribute.
    #[error("unhandled mime type: {0}")]
    UnsupportedMediaType(String),

    /// The output channel delivered a message type we do not understand.
    #[error("unhandled output message: {0}")]
    UnhandledMessageType(String),

    /// A kernel message lacked a required key or had the wrong shape.
    #[error("malformed {msg_type} message: {message}")]
    MalformedMessage { msg_type: String, message: String },

    /// A cell raised an uncaught error and the run was not skipping failures.
    #[error("cell execution failed (code cell {index})")]
    CellExecutionFailed {
        /// Position of the cell among the notebook's code cells.
        index: usize,
    },

    /// A cell position that does not exist in the notebook.
    #[error("cell not found: worksheet {worksheet}, cell {cell}")]
    CellNotFound { worksheet: usize, cell: usize },

    /// The kernel closed its channels.
    #[error("kernel disconnected")]
    KernelDisconnected,

    /// IPC communication error with the kernel process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Notebook read/write error.
    #[error(transparent)]
    Format(#[from] nbrun_format::FormatError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Render the error with a recovery hint for the command line.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::UnsupportedMediaType(_) => {
                Some("the kernel published a representation this format cannot store")
            }
            Error::UnhandledMessageType(_) | Error::MalformedMessage { .. } => {
                Some("the kernel speaks a protocol version nbrun does not support")
            }
            Error::CellExecutionFailed { .. } => {
                Some("pass --skip-exceptions to keep running the remaining cells")
            }
            Error::KernelDisconnected | Error::Ipc(_) => {
                Some("check that the kernel command starts and set NBRUN_KERNEL if it is not on PATH")
            }
            _ => None,
        };

        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_mentions_skip_flag() {
        let rendered = Error::CellExecutionFailed { index: 0 }.with_hint();
        assert!(rendered.starts_with("cell execution failed"));
        assert!(rendered.contains("--skip-exceptions"));
    }

    #[test]
    fn test_unsupported_media_type_message() {
        let err = Error::UnsupportedMediaType("application/pdf".into());
        assert_eq!(err.to_string(), "unhandled mime type: application/pdf");
    }
}
