//! Kernel launch configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the kernel executable.
pub const KERNEL_ENV: &str = "NBRUN_KERNEL";

/// Environment variable with extra whitespace-separated kernel arguments.
pub const KERNEL_ARGS_ENV: &str = "NBRUN_KERNEL_ARGS";

/// Default executable looked up on `PATH`.
pub const DEFAULT_KERNEL_BINARY: &str = "nbrun-kernel";

/// Configuration for starting a kernel session.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Kernel executable. If None, `NBRUN_KERNEL` or `nbrun-kernel` on PATH.
    pub command: Option<PathBuf>,

    /// Arguments passed to the kernel executable
    pub args: Vec<String>,

    /// Code executed once before the first cell (e.g. plotting setup)
    pub startup_code: Option<String>,

    /// Wait after the handshake before the first execute request
    pub ready_delay: Duration,

    /// Bounded wait for each receive on the output channel
    pub poll_timeout: Duration,

    /// How long to wait for the kernel to answer the first ping
    pub handshake_timeout: Duration,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            startup_code: None,
            ready_delay: default_ready_delay(),
            poll_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

/// macOS kernels sometimes drop the first request if it arrives too early.
fn default_ready_delay() -> Duration {
    if cfg!(target_os = "macos") {
        Duration::from_secs(1)
    } else {
        Duration::ZERO
    }
}

impl KernelConfig {
    /// Defaults overlaid with `NBRUN_KERNEL` and `NBRUN_KERNEL_ARGS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(command) = std::env::var(KERNEL_ENV)
            && !command.trim().is_empty()
        {
            config.command = Some(PathBuf::from(command));
        }
        if let Ok(args) = std::env::var(KERNEL_ARGS_ENV) {
            config.args = args.split_whitespace().map(String::from).collect();
        }
        config
    }

    /// Resolve the kernel executable.
    pub fn resolve_command(&self) -> crate::Result<PathBuf> {
        if let Some(command) = &self.command {
            return Ok(command.clone());
        }

        which::which(DEFAULT_KERNEL_BINARY).map_err(|_| {
            crate::Error::Ipc(format!(
                "Could not find {} binary. Set {} or pass --kernel.",
                DEFAULT_KERNEL_BINARY, KERNEL_ENV
            ))
        })
    }
}
