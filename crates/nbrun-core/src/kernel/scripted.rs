//! In-memory kernel that replays scripted executions.
//!
//! Each `execute` request consumes the next `ScriptedExecution`: its messages
//! are queued on the output channel (followed by an idle status) and its
//! reply on the control channel. Used to exercise the driver without a
//! kernel process.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{Error, Result};

use super::{ControlChannel, ExecuteReply, Kernel, KernelMessage, OutputChannel};

/// What the kernel emits for one execute request.
#[derive(Debug, Clone)]
pub struct ScriptedExecution {
    execution_count: i64,
    /// `None` entries make one poll come back empty.
    messages: Vec<Option<KernelMessage>>,
    reply: ExecuteReply,
}

impl ScriptedExecution {
    /// Busy status and input echo carrying `execution_count`, then an ok reply.
    pub fn new(execution_count: i64) -> Self {
        Self {
            execution_count,
            messages: vec![
                Some(KernelMessage::status("busy")),
                Some(KernelMessage::new(
                    "pyin",
                    json!({ "code": "", "execution_count": execution_count }),
                )),
            ],
            reply: ExecuteReply::ok(execution_count),
        }
    }

    /// Text on a named stream.
    pub fn stream(self, name: &str, text: &str) -> Self {
        self.message(KernelMessage::new(
            "stream",
            json!({ "name": name, "data": text }),
        ))
    }

    /// Display data with the given media-type bundle.
    pub fn display(self, data: Value) -> Self {
        self.message(KernelMessage::new(
            "display_data",
            json!({ "data": data, "metadata": {} }),
        ))
    }

    /// Execution result with the given media-type bundle.
    pub fn pyout(self, data: Value) -> Self {
        let execution_count = self.execution_count;
        self.message(KernelMessage::new(
            "pyout",
            json!({ "data": data, "execution_count": execution_count, "metadata": {} }),
        ))
    }

    /// An uncaught error: publishes `pyerr` and makes the reply an error.
    pub fn pyerr(mut self, ename: &str, evalue: &str, traceback: &[&str]) -> Self {
        self.reply = ExecuteReply::error(ename, evalue, traceback);
        self.message(KernelMessage::new(
            "pyerr",
            json!({ "ename": ename, "evalue": evalue, "traceback": traceback }),
        ))
    }

    /// Any other message.
    pub fn message(mut self, message: KernelMessage) -> Self {
        self.messages.push(Some(message));
        self
    }

    /// One poll that returns nothing.
    pub fn silence(mut self) -> Self {
        self.messages.push(None);
        self
    }

    /// Replace the reply.
    pub fn reply(mut self, reply: ExecuteReply) -> Self {
        self.reply = reply;
        self
    }
}

/// Kernel replaying `ScriptedExecution`s in order.
pub struct ScriptedKernel {
    control: ScriptedControl,
    output: ScriptedOutput,
}

struct ScriptedControl {
    script: VecDeque<ScriptedExecution>,
    submitted: Vec<String>,
    replies: VecDeque<ExecuteReply>,
    output_tx: Sender<Option<KernelMessage>>,
}

struct ScriptedOutput {
    messages: Receiver<Option<KernelMessage>>,
    empty_polls: usize,
}

impl ScriptedKernel {
    pub fn new() -> Self {
        let (output_tx, messages) = mpsc::channel();
        Self {
            control: ScriptedControl {
                script: VecDeque::new(),
                submitted: Vec::new(),
                replies: VecDeque::new(),
                output_tx,
            },
            output: ScriptedOutput {
                messages,
                empty_polls: 0,
            },
        }
    }

    /// Queue the response to the next execute request.
    pub fn expect(mut self, execution: ScriptedExecution) -> Self {
        self.control.script.push_back(execution);
        self
    }

    /// Code submitted so far, in order.
    pub fn submitted(&self) -> &[String] {
        &self.control.submitted
    }

    /// Scripted executions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.control.script.len()
    }

    /// Polls that returned no message.
    pub fn empty_polls(&self) -> usize {
        self.output.empty_polls
    }
}

impl Default for ScriptedKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for ScriptedKernel {
    fn channels(&mut self) -> (&mut dyn ControlChannel, &mut dyn OutputChannel) {
        (&mut self.control, &mut self.output)
    }
}

impl ControlChannel for ScriptedControl {
    fn execute(&mut self, code: &str) -> Result<()> {
        self.submitted.push(code.to_string());
        let execution = self.script.pop_front().ok_or_else(|| {
            Error::Ipc(format!("No scripted execution left for code {:?}", code))
        })?;

        for message in execution.messages {
            self.output_tx
                .send(message)
                .map_err(|_| Error::KernelDisconnected)?;
        }
        self.output_tx
            .send(Some(KernelMessage::status("idle")))
            .map_err(|_| Error::KernelDisconnected)?;
        self.replies.push_back(execution.reply);
        Ok(())
    }

    fn recv_reply(&mut self) -> Result<ExecuteReply> {
        self.replies
            .pop_front()
            .ok_or_else(|| Error::Ipc("Reply requested with no outstanding request".to_string()))
    }
}

impl OutputChannel for ScriptedOutput {
    fn recv(&mut self, _timeout: Duration) -> Result<Option<KernelMessage>> {
        match self.messages.try_recv() {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                self.empty_polls += 1;
                Ok(None)
            }
            // Nothing left will ever arrive; fail instead of spinning.
            Err(TryRecvError::Empty) => {
                Err(Error::Ipc("Scripted kernel has no more output".to_string()))
            }
            Err(TryRecvError::Disconnected) => Err(Error::KernelDisconnected),
        }
    }
}
