//! Execution engine for nbrun.
//!
//! # Architecture
//!
//! ```text
//! NotebookRunner (document order, skip policy, per-cell save)
//!     │
//!     └── CellExecutor (one cell: submit → drain until idle → reply)
//!             │
//!             ├── ControlChannel: execute / recv_reply
//!             ├── OutputChannel:  recv(poll_timeout)
//!             │       └── mime::classify for display payloads
//!             │
//!             └── NotebookSink: save after every output
//! ```
//!
//! # Module Structure
//!
//! - `cell` - CellExecutor and message translation
//! - `context` - Cell states, outcomes, callbacks, and checkpoint sinks
//! - `runner` - NotebookRunner for whole-notebook runs

mod cell;
mod context;
mod runner;

pub use cell::{CellExecutor, output_from_message};
pub use context::{
    CellOutcome, CellState, FileSink, NotebookSink, RunCallback, TracingCallback,
};
pub use runner::{NotebookRunner, RunOptions, RunSummary};
