//! Kernel channels.
//!
//! A kernel is reached through two independent queues:
//!
//! ```text
//!              execute(code)                 recv_reply()
//! driver ──► ControlChannel ──► kernel ──► ControlChannel ──► driver   (one reply per request)
//!                                  │
//!                                  └──► OutputChannel ──► driver       (stream, ends with idle)
//! ```
//!
//! The two are never merged: a request completes with exactly one reply,
//! while the output stream for that request ends with an idle status.

mod config;
pub mod protocol;
#[cfg(any(test, feature = "testing"))]
mod scripted;
mod session;

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub use config::KernelConfig;
pub use protocol::{KernelFrame, KernelRequest, read_message, write_message};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedExecution, ScriptedKernel};
pub use session::{KernelSession, ProcessControl, ProcessOutput};

/// Request/reply side of a kernel.
pub trait ControlChannel {
    /// Submit code for execution.
    fn execute(&mut self, code: &str) -> Result<()>;

    /// Block until the reply to the oldest outstanding request arrives.
    fn recv_reply(&mut self) -> Result<ExecuteReply>;
}

/// Broadcast side of a kernel.
pub trait OutputChannel {
    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time; it is not an error.
    fn recv(&mut self, timeout: Duration) -> Result<Option<KernelMessage>>;
}

/// A running kernel exposing both channels.
pub trait Kernel {
    fn channels(&mut self) -> (&mut dyn ControlChannel, &mut dyn OutputChannel);
}

/// Output channel message types the driver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Kernel state change (`busy` / `idle`).
    Status,
    /// Echo of the submitted code (`pyin`, later `execute_input`).
    InputEcho,
    /// Text written to stdout/stderr.
    Stream,
    /// Rich display data.
    DisplayData,
    /// Value of the final expression (`pyout`, later `execute_result`).
    ExecuteResult,
    /// Uncaught error (`pyerr`, later `error`).
    Error,
}

impl MessageType {
    /// Parse a wire message type; `None` for anything unrecognized.
    pub fn parse(msg_type: &str) -> Option<Self> {
        match msg_type {
            "status" => Some(MessageType::Status),
            "pyin" | "execute_input" => Some(MessageType::InputEcho),
            "stream" => Some(MessageType::Stream),
            "display_data" => Some(MessageType::DisplayData),
            "pyout" | "execute_result" => Some(MessageType::ExecuteResult),
            "pyerr" | "error" => Some(MessageType::Error),
            _ => None,
        }
    }
}

/// A message from the output channel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelMessage {
    pub msg_type: String,
    pub content: Map<String, Value>,
}

impl KernelMessage {
    /// Build a message; non-object content becomes an empty mapping.
    pub fn new(msg_type: impl Into<String>, content: Value) -> Self {
        let content = match content {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            msg_type: msg_type.into(),
            content,
        }
    }

    /// A status message with the given execution state.
    pub fn status(execution_state: &str) -> Self {
        Self::new(
            "status",
            serde_json::json!({ "execution_state": execution_state }),
        )
    }

    pub fn kind(&self) -> Option<MessageType> {
        MessageType::parse(&self.msg_type)
    }

    /// Whether this is the status message that ends a request's output.
    pub fn is_idle(&self) -> bool {
        self.kind() == Some(MessageType::Status)
            && self.content.get("execution_state").and_then(Value::as_str) == Some("idle")
    }

    /// Integer `execution_count`, if present.
    pub fn execution_count(&self) -> Option<i64> {
        self.content.get("execution_count").and_then(Value::as_i64)
    }

    /// Fetch a required content key.
    pub fn require(&self, key: &str) -> Result<&Value> {
        self.content.get(key).ok_or_else(|| self.malformed(format!("missing '{}'", key)))
    }

    /// Fetch a required string key.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| self.malformed(format!("'{}' is not a string", key)))
    }

    pub(crate) fn malformed(&self, message: String) -> Error {
        Error::MalformedMessage {
            msg_type: self.msg_type.clone(),
            message,
        }
    }
}

/// Reply to an execute request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteReply {
    pub content: Map<String, Value>,
}

impl ExecuteReply {
    pub fn new(content: Value) -> Self {
        let content = match content {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { content }
    }

    /// A successful reply.
    pub fn ok(execution_count: i64) -> Self {
        Self::new(serde_json::json!({
            "status": "ok",
            "execution_count": execution_count,
        }))
    }

    /// An error reply carrying the diagnostic.
    pub fn error(ename: &str, evalue: &str, traceback: &[&str]) -> Self {
        Self::new(serde_json::json!({
            "status": "error",
            "ename": ename,
            "evalue": evalue,
            "traceback": traceback,
        }))
    }

    /// The `status` field (`ok`, `error`, `abort`).
    pub fn status(&self) -> Result<&str> {
        self.content
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedMessage {
                msg_type: "execute_reply".to_string(),
                message: "missing 'status'".to_string(),
            })
    }

    /// Traceback lines; empty when the reply carries none.
    pub fn traceback(&self) -> Vec<String> {
        self.content
            .get("traceback")
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| line.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}
