//! Notebook document format for nbrun.
//!
//! Reads and writes nbformat v3 JSON documents: worksheets of cells, where
//! code cells carry an input, an ordered list of outputs, and an optional
//! prompt number.
//!
//! ```text
//! notebook.ipynb ──► Notebook::read_from_file ──► Notebook ──► (execution) ──► save ──► out.ipynb
//! ```

mod error;
mod notebook;
mod output;

pub use error::{FormatError, FormatResult};
pub use notebook::{Cell, CellRef, MultilineString, NBFORMAT, Notebook, Worksheet};
pub use output::{CellOutput, DisplayField, DisplayOutput, ErrorOutput, StreamOutput};

use std::path::Path;

/// Save a notebook, overwriting `target` with the full document.
pub fn save(notebook: &Notebook, target: impl AsRef<Path>) -> FormatResult<()> {
    let target = target.as_ref();
    tracing::info!("Saving to {}", target.display());
    notebook.write_to_file(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_save_overwrites_target() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("out.ipynb");
        std::fs::write(&path, "x".repeat(10_000)).unwrap();

        save(&Notebook::new(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.len() < 10_000);
        assert_eq!(Notebook::from_json_str(&written).unwrap(), Notebook::new());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_save_is_still_logged() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("missing-dir").join("out.ipynb");
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || {
            save(&Notebook::new(), &target)
        });

        assert!(matches!(result, Err(FormatError::WriteError { .. })));
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Saving to"), "Missing save log: {}", output);
    }
}
