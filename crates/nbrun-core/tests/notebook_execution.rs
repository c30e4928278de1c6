//! Integration tests for multi-cell notebook execution.
//!
//! Runs whole notebooks against a scripted kernel and checks what ends up in
//! the document and in the autosave checkpoints.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use nbrun_core::{
    Error, NotebookRunner, NotebookSink, RunOptions, ScriptedExecution, ScriptedKernel,
};
use nbrun_format::{Cell, CellOutput, Notebook, Worksheet};
use serde_json::json;

// =============================================================================
// Test Helpers
// =============================================================================

/// Sink that keeps a snapshot of every save instead of writing files.
#[derive(Clone, Default)]
struct RecordingSink {
    saves: Rc<RefCell<Vec<Notebook>>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.saves.borrow().len()
    }

    fn snapshot(&self, index: usize) -> Notebook {
        self.saves.borrow()[index].clone()
    }
}

impl NotebookSink for RecordingSink {
    fn save(&mut self, notebook: &Notebook, _target: &Path) -> nbrun_core::Result<()> {
        self.saves.borrow_mut().push(notebook.clone());
        Ok(())
    }
}

fn notebook_with(cells: Vec<Cell>) -> Notebook {
    let mut notebook = Notebook::new();
    notebook.worksheets[0].cells = cells;
    notebook
}

/// Three code cells where the middle one raises.
fn failing_middle() -> (Notebook, ScriptedKernel) {
    let notebook = notebook_with(vec![
        Cell::code("print('a')"),
        Cell::code("raise ValueError('b')"),
        Cell::code("print('c')"),
    ]);
    let kernel = ScriptedKernel::new()
        .expect(ScriptedExecution::new(1).stream("stdout", "a\n"))
        .expect(ScriptedExecution::new(2).pyerr(
            "ValueError",
            "b",
            &["Traceback (most recent call last)", "ValueError: b"],
        ))
        .expect(ScriptedExecution::new(3).stream("stdout", "c\n"));
    (notebook, kernel)
}

fn autosave_options() -> RunOptions {
    RunOptions {
        skip_exceptions: false,
        autosave: Some(PathBuf::from("checkpoint.ipynb")),
    }
}

// =============================================================================
// Ordering and Prompt Numbers
// =============================================================================

#[test]
fn test_outputs_keep_arrival_order() {
    let mut notebook = notebook_with(vec![Cell::code("print('x'); 42")]);
    let kernel = ScriptedKernel::new().expect(
        ScriptedExecution::new(1)
            .stream("stdout", "x\n")
            .silence()
            .display(json!({ "text/plain": "<figure>" }))
            .pyout(json!({ "text/plain": "42" })),
    );
    let mut runner = NotebookRunner::new(kernel);

    runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap();

    let cell = notebook.code_cells().next().unwrap();
    let types: Vec<_> = cell.outputs().iter().map(CellOutput::output_type).collect();
    assert_eq!(types, ["stream", "display_data", "pyout"]);
    assert_eq!(runner.kernel().empty_polls(), 1);
}

#[test]
fn test_prompt_number_is_counter_minus_one() {
    let mut notebook = notebook_with(vec![Cell::code("1 + 1")]);
    let kernel = ScriptedKernel::new()
        .expect(ScriptedExecution::new(5).pyout(json!({ "text/plain": "2" })));
    let mut runner = NotebookRunner::new(kernel);

    runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap();

    let cell = notebook.code_cells().next().unwrap();
    assert_eq!(cell.prompt_number, Some(4));
    assert_eq!(cell.outputs()[0].prompt_number(), Some(4));
}

#[test]
fn test_worksheets_run_in_document_order() {
    let mut notebook = Notebook::new();
    notebook.worksheets[0].cells.push(Cell::code("first"));
    notebook.worksheets.push(Worksheet::default());
    notebook.worksheets[1].cells.push(Cell::markdown("# Second sheet"));
    notebook.worksheets[1].cells.push(Cell::code("second"));
    let kernel = ScriptedKernel::new()
        .expect(ScriptedExecution::new(1))
        .expect(ScriptedExecution::new(2));
    let mut runner = NotebookRunner::new(kernel);

    let summary = runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap();

    assert_eq!(summary.executed, 2);
    assert_eq!(runner.kernel().submitted(), ["first", "second"]);
    assert_eq!(notebook.worksheets[1].cells[1].prompt_number, Some(1));
}

#[test]
fn test_non_code_cells_untouched() {
    let heading = Cell::markdown("# Results");
    let mut notebook = notebook_with(vec![heading.clone(), Cell::code("x = 1")]);
    let kernel = ScriptedKernel::new().expect(ScriptedExecution::new(1));
    let mut runner = NotebookRunner::new(kernel);

    runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap();

    assert_eq!(notebook.worksheets[0].cells[0], heading);
}

// =============================================================================
// Failure Policy
// =============================================================================

#[test]
fn test_failure_without_skip_stops_at_cell() {
    let (mut notebook, kernel) = failing_middle();
    let mut runner = NotebookRunner::new(kernel);

    let err = runner
        .run_notebook(&mut notebook, &RunOptions::default())
        .unwrap_err();

    assert!(matches!(err, Error::CellExecutionFailed { index: 1 }));
    assert_eq!(runner.kernel().submitted().len(), 2);

    let cells: Vec<_> = notebook.code_cells().collect();
    assert_eq!(cells[1].outputs()[0].output_type(), "pyerr");
    assert!(cells[2].outputs().is_empty(), "Third cell never ran");
    assert_eq!(cells[2].prompt_number, None);
}

#[test]
fn test_failure_with_skip_runs_remaining_cells() {
    let (mut notebook, kernel) = failing_middle();
    let mut runner = NotebookRunner::new(kernel);
    let options = RunOptions {
        skip_exceptions: true,
        autosave: None,
    };

    let summary = runner.run_notebook(&mut notebook, &options).unwrap();

    assert_eq!(summary.executed, 3);
    assert_eq!(summary.failed, vec![1]);
    let cells: Vec<_> = notebook.code_cells().collect();
    assert_eq!(cells[2].outputs().len(), 1);
    assert_eq!(cells[2].prompt_number, Some(2));
}

#[test]
fn test_failed_cell_is_saved_before_error() {
    let (mut notebook, kernel) = failing_middle();
    let sink = RecordingSink::default();
    let mut runner = NotebookRunner::new(kernel).with_sink(sink.clone());

    let result = runner.run_notebook(&mut notebook, &autosave_options());

    assert!(result.is_err());
    let last = sink.snapshot(sink.count() - 1);
    assert_eq!(last, notebook);
    let failed = last.code_cells().nth(1).unwrap();
    assert_eq!(failed.outputs()[0].output_type(), "pyerr");
}

#[test]
fn test_unknown_media_type_aborts_even_when_skipping() {
    let mut notebook = notebook_with(vec![Cell::code("plot()"), Cell::code("1")]);
    let kernel = ScriptedKernel::new()
        .expect(ScriptedExecution::new(1).display(json!({ "image/svg+xml": "<svg/>" })))
        .expect(ScriptedExecution::new(2));
    let mut runner = NotebookRunner::new(kernel);
    let options = RunOptions {
        skip_exceptions: true,
        autosave: None,
    };

    let err = runner.run_notebook(&mut notebook, &options).unwrap_err();

    assert!(matches!(err, Error::UnsupportedMediaType(ref mime) if mime == "image/svg+xml"));
    assert_eq!(runner.kernel().remaining(), 1);
}

// =============================================================================
// Autosave
// =============================================================================

#[test]
fn test_autosave_after_each_output_and_cell() {
    let mut notebook = notebook_with(vec![Cell::code("print(1); 2"), Cell::code("x = 3")]);
    let kernel = ScriptedKernel::new()
        .expect(
            ScriptedExecution::new(1)
                .stream("stdout", "1\n")
                .pyout(json!({ "text/plain": "2" })),
        )
        .expect(ScriptedExecution::new(2));
    let sink = RecordingSink::default();
    let mut runner = NotebookRunner::new(kernel).with_sink(sink.clone());

    runner.run_notebook(&mut notebook, &autosave_options()).unwrap();

    // initial + (2 outputs + 1) + (0 outputs + 1)
    assert_eq!(sink.count(), 5);
    assert!(sink.snapshot(0).code_cells().all(|cell| cell.outputs().is_empty()));
    assert_eq!(sink.snapshot(1).code_cells().next().unwrap().outputs().len(), 1);
    assert_eq!(sink.snapshot(2).code_cells().next().unwrap().outputs().len(), 2);
    assert_eq!(sink.snapshot(4), notebook);
}

#[test]
fn test_no_saves_without_autosave_target() {
    let mut notebook = notebook_with(vec![Cell::code("print(1)")]);
    let kernel =
        ScriptedKernel::new().expect(ScriptedExecution::new(1).stream("stdout", "1\n"));
    let sink = RecordingSink::default();
    let mut runner = NotebookRunner::new(kernel).with_sink(sink.clone());

    runner.run_notebook(&mut notebook, &RunOptions::default()).unwrap();

    assert_eq!(sink.count(), 0);
}

#[test]
fn test_autosave_file_matches_result() {
    let temp = tempfile::TempDir::new().unwrap();
    let input = temp.path().join("input.ipynb");
    let checkpoint = temp.path().join("checkpoint.ipynb");
    notebook_with(vec![Cell::markdown("# Title"), Cell::code("'hi'")])
        .write_to_file(&input)
        .unwrap();

    let kernel = ScriptedKernel::new().expect(
        ScriptedExecution::new(1).pyout(json!({ "text/plain": "'hi'", "text/html": "<b>hi</b>" })),
    );
    let mut runner = NotebookRunner::new(kernel);
    let options = RunOptions {
        skip_exceptions: false,
        autosave: Some(checkpoint.clone()),
    };

    let result = runner.run_notebook_file(&input, &options).unwrap();

    assert_eq!(Notebook::read_from_file(&checkpoint).unwrap(), result);
}

// =============================================================================
// Reset and Round-trip
// =============================================================================

#[test]
fn test_rerun_replaces_previous_outputs() {
    let script = || {
        ScriptedKernel::new().expect(ScriptedExecution::new(1).stream("stdout", "once\n"))
    };
    let mut notebook = notebook_with(vec![Cell::code("print('once')")]);

    NotebookRunner::new(script())
        .run_notebook(&mut notebook, &RunOptions::default())
        .unwrap();
    let first = notebook.clone();
    NotebookRunner::new(script())
        .run_notebook(&mut notebook, &RunOptions::default())
        .unwrap();

    assert_eq!(notebook, first);
    assert_eq!(notebook.code_cells().next().unwrap().outputs().len(), 1);
}

#[test]
fn test_empty_notebook_roundtrip() {
    let temp = tempfile::TempDir::new().unwrap();
    let input = temp.path().join("empty.ipynb");
    Notebook::new().write_to_file(&input).unwrap();

    let mut runner = NotebookRunner::new(ScriptedKernel::new());
    let result = runner
        .run_notebook_file(&input, &RunOptions::default())
        .unwrap();

    assert_eq!(result, Notebook::new());
    assert!(runner.kernel().submitted().is_empty());
}
