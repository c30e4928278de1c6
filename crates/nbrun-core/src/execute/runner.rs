//! Whole-notebook execution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nbrun_format::Notebook;

use crate::error::{Error, Result};
use crate::kernel::Kernel;

use super::cell::CellExecutor;
use super::context::{CellOutcome, FileSink, NotebookSink, RunCallback};

/// Options for a notebook run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Keep running later cells after a cell fails.
    pub skip_exceptions: bool,

    /// Save the notebook here after every output and every cell.
    pub autosave: Option<PathBuf>,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of code cells executed.
    pub executed: usize,

    /// Code-cell indices of cells that failed (only non-empty when skipping).
    pub failed: Vec<usize>,
}

/// Runs every code cell of a notebook against one kernel, in order.
pub struct NotebookRunner<K: Kernel> {
    kernel: K,
    sink: Box<dyn NotebookSink>,
    callback: Option<Box<dyn RunCallback>>,
    poll_timeout: Duration,
}

impl<K: Kernel> NotebookRunner<K> {
    /// Create a runner saving checkpoints to disk.
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            sink: Box::new(FileSink),
            callback: None,
            poll_timeout: Duration::from_secs(1),
        }
    }

    /// Replace the checkpoint sink.
    pub fn with_sink(mut self, sink: impl NotebookSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Set the progress callback.
    pub fn with_callback(mut self, callback: impl RunCallback + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Bounded wait for each receive on the output channel.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn into_kernel(self) -> K {
        self.kernel
    }

    /// Run all code cells of `notebook` in document order.
    ///
    /// Outputs and prompt numbers of every code cell are cleared first. A
    /// failing cell stops the run with `Error::CellExecutionFailed` unless
    /// `skip_exceptions` is set. Protocol errors always stop the run.
    pub fn run_notebook(
        &mut self,
        notebook: &mut Notebook,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        notebook.clear_outputs();

        let autosave = options.autosave.as_deref();
        if let Some(target) = autosave {
            self.sink.save(notebook, target)?;
        }

        let mut summary = RunSummary::default();
        for (index, at) in notebook.code_cell_refs().into_iter().enumerate() {
            let mut executor =
                CellExecutor::new(&mut self.kernel, self.sink.as_mut(), self.poll_timeout);
            if let Some(callback) = self.callback.as_deref() {
                executor = executor.with_callback(callback);
            }
            let outcome = executor.run_cell(notebook, at, autosave)?;
            summary.executed += 1;

            if outcome == CellOutcome::Failed {
                summary.failed.push(index);
            }

            if let Some(target) = autosave {
                self.sink.save(notebook, target)?;
            }

            if outcome == CellOutcome::Failed && !options.skip_exceptions {
                return Err(Error::CellExecutionFailed { index });
            }
        }

        tracing::info!(
            "Executed {} cells ({} failed)",
            summary.executed,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Read a notebook file, run it, and return the updated document.
    pub fn run_notebook_file(
        &mut self,
        input: impl AsRef<Path>,
        options: &RunOptions,
    ) -> Result<Notebook> {
        let mut notebook = Notebook::read_from_file(input)?;
        self.run_notebook(&mut notebook, options)?;
        Ok(notebook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{ScriptedExecution, ScriptedKernel};
    use nbrun_format::Cell;

    #[test]
    fn test_run_empty_notebook() {
        let mut runner = NotebookRunner::new(ScriptedKernel::new());
        let mut notebook = Notebook::new();

        let summary = runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap();

        assert_eq!(summary, RunSummary::default());
        assert_eq!(notebook, Notebook::new());
    }

    #[test]
    fn test_failure_stops_run() {
        let kernel = ScriptedKernel::new()
            .expect(ScriptedExecution::new(1).pyerr("ValueError", "bad", &[]))
            .expect(ScriptedExecution::new(2));
        let mut runner = NotebookRunner::new(kernel);
        let mut notebook = Notebook::new();
        notebook.worksheets[0].cells.push(Cell::code("raise ValueError('bad')"));
        notebook.worksheets[0].cells.push(Cell::code("1"));

        let err = runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap_err();

        assert!(matches!(err, Error::CellExecutionFailed { index: 0 }));
        assert_eq!(runner.kernel().remaining(), 1, "Second cell never submitted");
    }

    #[test]
    fn test_clears_stale_outputs_before_running() {
        let kernel = ScriptedKernel::new().expect(ScriptedExecution::new(3));
        let mut runner = NotebookRunner::new(kernel);
        let mut notebook = Notebook::new();
        let mut cell = Cell::code("x = 1");
        cell.prompt_number = Some(9);
        cell.push_output(nbrun_format::CellOutput::Stream(nbrun_format::StreamOutput {
            stream: "stdout".to_string(),
            text: "stale".into(),
            prompt_number: Some(9),
        }));
        notebook.worksheets[0].cells.push(cell);

        runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap();

        let cell = notebook.code_cells().next().unwrap();
        assert!(cell.outputs().is_empty());
        assert_eq!(cell.prompt_number, Some(2));
    }
}
