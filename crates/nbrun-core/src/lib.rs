//! Core engine for nbrun, a headless notebook runner.
//!
//! This crate provides:
//! - Kernel channel traits and a process-backed kernel session
//! - Media type classification for display payloads
//! - Cell and notebook execution with autosave checkpoints

pub mod error;
pub mod execute;
pub mod kernel;
pub mod mime;

pub use error::{Error, Result};
pub use execute::{
    CellExecutor, CellOutcome, CellState, FileSink, NotebookRunner, NotebookSink, RunCallback,
    RunOptions, RunSummary, TracingCallback, output_from_message,
};
pub use kernel::{
    ControlChannel, ExecuteReply, Kernel, KernelConfig, KernelMessage, KernelSession, MessageType,
    OutputChannel,
};

#[cfg(any(test, feature = "testing"))]
pub use kernel::{ScriptedExecution, ScriptedKernel};
