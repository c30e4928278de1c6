//! Kernel process lifecycle.
//!
//! `KernelSession` spawns the kernel executable, checks it is alive, and
//! splits its single stdout stream into the control and output queues with
//! one router thread.

use std::io::{BufReader, BufWriter, Read};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{Error, Result};

use super::config::KernelConfig;
use super::protocol::{KernelFrame, KernelRequest, decode_content, read_message, write_message};
use super::{ControlChannel, ExecuteReply, Kernel, KernelMessage, OutputChannel};

/// How long `shutdown` waits for the kernel to acknowledge.
const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Control-queue events produced by the router.
#[derive(Debug)]
enum ControlEvent {
    Reply(ExecuteReply),
    Pong,
    ShuttingDown,
}

/// Handle to a running kernel process.
pub struct KernelSession {
    /// The child process.
    child: Child,
    control: ProcessControl,
    output: ProcessOutput,
    /// Demultiplexes kernel stdout into the two queues.
    router: Option<JoinHandle<()>>,
    /// Whether the process has been shut down or killed.
    stopped: bool,
}

/// Control channel of a kernel process.
pub struct ProcessControl {
    stdin: BufWriter<ChildStdin>,
    events: Receiver<Result<ControlEvent>>,
}

/// Output channel of a kernel process.
pub struct ProcessOutput {
    messages: Receiver<Result<KernelMessage>>,
}

impl KernelSession {
    /// Spawn a kernel and wait until it is ready for the first request.
    pub fn start(config: &KernelConfig) -> Result<Self> {
        let command = config.resolve_command()?;

        let mut child = Command::new(&command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "Failed to spawn kernel '{}': {}",
                    command.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get kernel stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get kernel stdout".to_string()))?;

        let (control_tx, control_rx) = mpsc::channel();
        let (output_tx, output_rx) = mpsc::channel();
        let router = std::thread::Builder::new()
            .name("nbrun-kernel-router".to_string())
            .spawn(move || route_frames(BufReader::new(stdout), control_tx, output_tx))?;

        let mut session = Self {
            child,
            control: ProcessControl {
                stdin: BufWriter::new(stdin),
                events: control_rx,
            },
            output: ProcessOutput {
                messages: output_rx,
            },
            router: Some(router),
            stopped: false,
        };

        tracing::debug!(
            "Started kernel {} (pid {})",
            command.display(),
            session.pid()
        );

        session.control.ping(config.handshake_timeout)?;

        if !config.ready_delay.is_zero() {
            std::thread::sleep(config.ready_delay);
        }

        if let Some(code) = &config.startup_code {
            session.warm_up(code, config.poll_timeout)?;
        }

        Ok(session)
    }

    /// Run setup code and discard everything it produced.
    fn warm_up(&mut self, code: &str, poll_timeout: Duration) -> Result<()> {
        self.control.execute(code)?;

        let mut discarded = 0usize;
        loop {
            match self.output.recv(poll_timeout)? {
                Some(message) if message.is_idle() => break,
                Some(_) => discarded += 1,
                None => {}
            }
        }

        let reply = self.control.recv_reply()?;
        tracing::info!(
            "Startup code returned {} ({} messages discarded)",
            reply.status().unwrap_or("<no status>"),
            discarded
        );
        Ok(())
    }

    /// Get the process ID of the kernel.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Graceful shutdown - ask the kernel to exit and reap it.
    pub fn shutdown(mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        if self.control.send(&KernelRequest::Shutdown).is_ok() {
            match self.control.await_shutdown_ack() {
                Ok(()) => tracing::debug!("Kernel acknowledged shutdown"),
                Err(Error::KernelDisconnected) => {}
                Err(e) => {
                    tracing::warn!("{}, killing kernel", e);
                    let _ = self.child.kill();
                }
            }
        }

        let status = self
            .child
            .wait()
            .map_err(|e| Error::Ipc(format!("Failed to wait for kernel: {}", e)))?;

        if let Some(router) = self.router.take() {
            let _ = router.join();
        }

        if status.success() {
            tracing::debug!("Kernel shut down");
            Ok(())
        } else {
            Err(Error::Ipc(format!("Kernel exited with status: {}", status)))
        }
    }

    /// Kill the kernel process immediately.
    pub fn kill(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Err(e) = self.child.kill() {
            // Already exited
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("Failed to kill kernel: {}", e);
            }
        }

        // Wait to reap zombie
        let _ = self.child.wait();
    }
}

impl Kernel for KernelSession {
    fn channels(&mut self) -> (&mut dyn ControlChannel, &mut dyn OutputChannel) {
        (&mut self.control, &mut self.output)
    }
}

impl Drop for KernelSession {
    fn drop(&mut self) {
        self.kill();
    }
}

impl ProcessControl {
    fn send(&mut self, request: &KernelRequest) -> Result<()> {
        write_message(&mut self.stdin, request)
    }

    fn recv_event(&mut self, timeout: Option<Duration>) -> Result<ControlEvent> {
        match timeout {
            Some(timeout) => self.events.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    Error::Ipc(format!("Kernel did not respond within {:?}", timeout))
                }
                RecvTimeoutError::Disconnected => Error::KernelDisconnected,
            })?,
            None => self.events.recv().map_err(|_| Error::KernelDisconnected)?,
        }
    }

    /// Wait for `ShuttingDown`, skipping events left over from earlier requests.
    fn await_shutdown_ack(&mut self) -> Result<()> {
        loop {
            match self.recv_event(Some(SHUTDOWN_ACK_TIMEOUT)) {
                Ok(ControlEvent::ShuttingDown) => return Ok(()),
                Ok(other) => tracing::debug!("Discarding {:?} while shutting down", other),
                Err(Error::Ipc(_)) => {
                    return Err(Error::Ipc(format!(
                        "Kernel did not acknowledge shutdown within {:?}",
                        SHUTDOWN_ACK_TIMEOUT
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Verify the kernel answers a ping.
    fn ping(&mut self, timeout: Duration) -> Result<()> {
        self.send(&KernelRequest::Ping)?;
        match self.recv_event(Some(timeout))? {
            ControlEvent::Pong => Ok(()),
            other => Err(Error::Ipc(format!(
                "Unexpected response from kernel: {:?}",
                other
            ))),
        }
    }
}

impl ControlChannel for ProcessControl {
    fn execute(&mut self, code: &str) -> Result<()> {
        self.send(&KernelRequest::Execute {
            code: code.to_string(),
        })
    }

    fn recv_reply(&mut self) -> Result<ExecuteReply> {
        match self.recv_event(None)? {
            ControlEvent::Reply(reply) => Ok(reply),
            other => Err(Error::Ipc(format!(
                "Unexpected response when awaiting reply: {:?}",
                other
            ))),
        }
    }
}

impl OutputChannel for ProcessOutput {
    fn recv(&mut self, timeout: Duration) -> Result<Option<KernelMessage>> {
        match self.messages.recv_timeout(timeout) {
            Ok(message) => message.map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::KernelDisconnected),
        }
    }
}

/// Read frames until the stream ends, sending each to its queue.
///
/// Returning drops both senders, so pending receivers see a disconnect.
fn route_frames<R: Read>(
    mut reader: R,
    control: Sender<Result<ControlEvent>>,
    output: Sender<Result<KernelMessage>>,
) {
    loop {
        let frame = match read_message::<_, KernelFrame>(&mut reader) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Kernel stream closed: {}", e);
                return;
            }
        };

        let delivered = match frame {
            KernelFrame::Reply { content_json } => {
                let event = decode_content(&content_json)
                    .map(|content| ControlEvent::Reply(ExecuteReply { content }));
                control.send(event).is_ok()
            }
            KernelFrame::Broadcast {
                msg_type,
                content_json,
            } => {
                let message = decode_content(&content_json)
                    .map(|content| KernelMessage { msg_type, content });
                output.send(message).is_ok()
            }
            KernelFrame::Pong => control.send(Ok(ControlEvent::Pong)).is_ok(),
            KernelFrame::ShuttingDown => control.send(Ok(ControlEvent::ShuttingDown)).is_ok(),
        };

        if !delivered {
            tracing::debug!("Kernel channel receiver dropped, stopping router");
            return;
        }
    }
}
