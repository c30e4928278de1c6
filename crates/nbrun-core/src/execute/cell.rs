//! Single-cell execution.
//!
//! Submits a cell's input, drains the output channel until the kernel goes
//! idle, turns each message into a document output, then reads the reply.

use std::path::Path;
use std::time::Duration;

use nbrun_format::{
    Cell, CellOutput, CellRef, DisplayOutput, ErrorOutput, MultilineString, Notebook, StreamOutput,
};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::kernel::{ControlChannel, Kernel, KernelMessage, MessageType, OutputChannel};
use crate::mime;

use super::context::{CellOutcome, CellState, NotebookSink, RunCallback};

/// Drives one cell at a time against a kernel.
pub struct CellExecutor<'k> {
    control: &'k mut dyn ControlChannel,
    output: &'k mut dyn OutputChannel,
    sink: &'k mut dyn NotebookSink,
    callback: Option<&'k dyn RunCallback>,
    poll_timeout: Duration,
    state: CellState,
}

impl<'k> CellExecutor<'k> {
    pub fn new(
        kernel: &'k mut dyn Kernel,
        sink: &'k mut dyn NotebookSink,
        poll_timeout: Duration,
    ) -> Self {
        let (control, output) = kernel.channels();
        Self {
            control,
            output,
            sink,
            callback: None,
            poll_timeout,
            state: CellState::Pending,
        }
    }

    /// Set the progress callback.
    pub fn with_callback(mut self, callback: &'k dyn RunCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// State of the most recent cell.
    pub fn state(&self) -> CellState {
        self.state
    }

    fn transition(&mut self, at: CellRef, state: CellState) {
        self.state = state;
        if let Some(callback) = self.callback {
            callback.on_state_changed(at, state);
        }
    }

    /// Run the cell at `at` and record its outputs in place.
    ///
    /// The cell's outputs must already be empty. With an `autosave` target
    /// the whole notebook is saved after every appended output.
    ///
    /// Returns `CellOutcome::Failed` when the kernel reports an error for
    /// the cell; protocol problems (unknown media or message types) are
    /// returned as errors.
    pub fn run_cell(
        &mut self,
        notebook: &mut Notebook,
        at: CellRef,
        autosave: Option<&Path>,
    ) -> Result<CellOutcome> {
        self.state = CellState::Pending;
        let input = cell_mut(notebook, at)?.input_text();

        tracing::info!("Running cell {}:{}", at.worksheet, at.cell);
        tracing::debug!("Cell input:\n{}\n", input);
        if let Some(callback) = self.callback {
            callback.on_cell_started(at, &input);
        }

        self.control.execute(&input)?;
        self.transition(at, CellState::Submitted);
        self.transition(at, CellState::Draining);

        loop {
            let Some(message) = self.output.recv(self.poll_timeout)? else {
                continue;
            };
            if message.is_idle() {
                break;
            }

            let prompt_number = message
                .execution_count()
                .map(|count| {
                    count.checked_sub(1).ok_or_else(|| {
                        message.malformed(format!("execution_count {} out of range", count))
                    })
                })
                .transpose()?;
            let cell = cell_mut(notebook, at)?;
            if let Some(prompt_number) = prompt_number {
                cell.prompt_number = Some(prompt_number);
            }

            let Some(mut output) = output_from_message(&message)? else {
                continue;
            };
            if let Some(prompt_number) = prompt_number {
                output.set_prompt_number(prompt_number);
            }

            cell.push_output(output);
            if let (Some(callback), Some(output)) = (self.callback, cell.outputs().last()) {
                callback.on_cell_output(at, output);
            }

            if let Some(target) = autosave {
                self.sink.save(notebook, target)?;
            }
        }
        self.transition(at, CellState::IdleReceived);

        let reply = self.control.recv_reply()?;
        self.transition(at, CellState::ReplyReceived);

        let outcome = if reply.status()? == "error" {
            tracing::info!(
                "Cell raised uncaught exception: \n{}",
                reply.traceback().join("\n")
            );
            CellOutcome::Failed
        } else {
            tracing::info!("Cell returned");
            CellOutcome::Completed
        };

        self.transition(at, outcome.into());
        if let Some(callback) = self.callback {
            callback.on_cell_finished(at, outcome);
        }
        Ok(outcome)
    }
}

fn cell_mut(notebook: &mut Notebook, at: CellRef) -> Result<&mut Cell> {
    notebook.cell_mut(at).ok_or(Error::CellNotFound {
        worksheet: at.worksheet,
        cell: at.cell,
    })
}

/// Translate an output channel message into a document output.
///
/// Status and input-echo messages produce nothing.
pub fn output_from_message(message: &KernelMessage) -> Result<Option<CellOutput>> {
    let Some(kind) = message.kind() else {
        return Err(Error::UnhandledMessageType(message.msg_type.clone()));
    };

    let output = match kind {
        MessageType::Status | MessageType::InputEcho => return Ok(None),
        MessageType::Stream => {
            let stream = message.require_str("name")?.to_string();
            // Older kernels send `data`, newer ones `text`
            let text = match message.content.get("data") {
                Some(data) => data,
                None => message.require("text")?,
            };
            CellOutput::Stream(StreamOutput {
                stream,
                text: to_multiline(message, text)?,
                prompt_number: None,
            })
        }
        MessageType::DisplayData => CellOutput::DisplayData(display_output(message)?),
        MessageType::ExecuteResult => CellOutput::Pyout(display_output(message)?),
        MessageType::Error => CellOutput::Pyerr(ErrorOutput {
            ename: message.require_str("ename")?.to_string(),
            evalue: message.require_str("evalue")?.to_string(),
            traceback: traceback_lines(message)?,
            prompt_number: None,
        }),
    };

    Ok(Some(output))
}

/// Store every representation in the payload under its attribute.
fn display_output(message: &KernelMessage) -> Result<DisplayOutput> {
    let data = message
        .require("data")?
        .as_object()
        .ok_or_else(|| message.malformed("'data' is not a mapping".to_string()))?;

    let mut display = DisplayOutput::default();
    for (media_type, value) in data {
        let field = mime::classify(media_type)?;
        display.set(field, to_multiline(message, value)?);
    }
    Ok(display)
}

fn traceback_lines(message: &KernelMessage) -> Result<Vec<String>> {
    let lines = message
        .require("traceback")?
        .as_array()
        .ok_or_else(|| message.malformed("'traceback' is not a list".to_string()))?;

    lines
        .iter()
        .map(|line| {
            line.as_str()
                .map(String::from)
                .ok_or_else(|| message.malformed("traceback line is not a string".to_string()))
        })
        .collect()
}

fn to_multiline(message: &KernelMessage, value: &Value) -> Result<MultilineString> {
    serde_json::from_value(value.clone())
        .map_err(|e| message.malformed(format!("expected text: {}", e)))
}
