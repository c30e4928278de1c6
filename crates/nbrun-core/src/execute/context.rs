//! Execution state, outcomes, and hooks for a notebook run.

use std::path::Path;

use nbrun_format::{CellOutput, CellRef, Notebook};

use crate::error::Result;

/// Lifecycle of one cell's execution.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Pending,
    /// Execute request sent on the control channel.
    Submitted,
    /// Consuming the output channel.
    Draining,
    /// The idle status arrived; no further output for this request.
    IdleReceived,
    /// The execute reply arrived.
    ReplyReceived,
    Completed,
    Failed,
}

impl CellState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CellState::Completed | CellState::Failed)
    }
}

/// How a cell's execution ended.
///
/// A failure carries no payload: the diagnostic is already stored in the
/// cell as an error output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOutcome {
    Completed,
    Failed,
}

impl From<CellOutcome> for CellState {
    fn from(outcome: CellOutcome) -> Self {
        match outcome {
            CellOutcome::Completed => CellState::Completed,
            CellOutcome::Failed => CellState::Failed,
        }
    }
}

/// Callback trait for run progress reporting.
///
/// All methods default to no-ops.
pub trait RunCallback {
    /// Called when a cell is about to be submitted.
    fn on_cell_started(&self, _cell: CellRef, _input: &str) {}

    /// Called on every state transition of the running cell.
    fn on_state_changed(&self, _cell: CellRef, _state: CellState) {}

    /// Called after an output has been appended to the cell.
    fn on_cell_output(&self, _cell: CellRef, _output: &CellOutput) {}

    /// Called when the cell reaches a terminal state.
    fn on_cell_finished(&self, _cell: CellRef, _outcome: CellOutcome) {}
}

/// Callback that reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallback;

impl RunCallback for TracingCallback {
    fn on_cell_started(&self, cell: CellRef, input: &str) {
        tracing::debug!(
            "Cell {}:{} submitted ({} lines)",
            cell.worksheet,
            cell.cell,
            input.lines().count()
        );
    }

    fn on_state_changed(&self, cell: CellRef, state: CellState) {
        tracing::trace!("Cell {}:{} -> {:?}", cell.worksheet, cell.cell, state);
    }

    fn on_cell_output(&self, cell: CellRef, output: &CellOutput) {
        tracing::debug!(
            "Cell {}:{} produced {} output",
            cell.worksheet,
            cell.cell,
            output.output_type()
        );
    }

    fn on_cell_finished(&self, cell: CellRef, outcome: CellOutcome) {
        match outcome {
            CellOutcome::Completed => {
                tracing::info!("Cell {}:{} completed", cell.worksheet, cell.cell)
            }
            CellOutcome::Failed => {
                tracing::warn!("Cell {}:{} failed", cell.worksheet, cell.cell)
            }
        }
    }
}

/// Where checkpoints of the document go.
pub trait NotebookSink {
    /// Overwrite `target` with the full document.
    fn save(&mut self, notebook: &Notebook, target: &Path) -> Result<()>;
}

/// Sink writing the notebook file to disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSink;

impl NotebookSink for FileSink {
    fn save(&mut self, notebook: &Notebook, target: &Path) -> Result<()> {
        nbrun_format::save(notebook, target)?;
        Ok(())
    }
}
