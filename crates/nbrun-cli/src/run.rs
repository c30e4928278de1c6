//! Run command implementation for nbrun CLI.
//!
//! Executes a notebook headlessly against a kernel process and writes the
//! result, also when a cell fails.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use nbrun_core::{
    KernelConfig, KernelSession, NotebookRunner, RunOptions, RunSummary, TracingCallback,
};
use nbrun_format::Notebook;

/// Arguments of `nbrun run`.
pub struct RunArgs {
    pub notebook: PathBuf,
    pub output: Option<PathBuf>,
    pub overwrite: bool,
    pub skip_exceptions: bool,
    pub autosave: Option<PathBuf>,
    pub kernel: Option<PathBuf>,
    pub kernel_args: Vec<String>,
    pub startup_code: Option<String>,
    pub poll_timeout_ms: Option<u64>,
}

impl RunArgs {
    fn kernel_config(&self) -> KernelConfig {
        let mut config = KernelConfig::from_env();
        if let Some(kernel) = &self.kernel {
            config.command = Some(kernel.clone());
        }
        if !self.kernel_args.is_empty() {
            config.args = self.kernel_args.clone();
        }
        if let Some(code) = &self.startup_code {
            config.startup_code = Some(code.clone());
        }
        if let Some(ms) = self.poll_timeout_ms {
            config.poll_timeout = Duration::from_millis(ms);
        }
        config
    }

    fn destination(&self) -> Option<PathBuf> {
        if self.overwrite {
            Some(self.notebook.clone())
        } else {
            self.output.clone()
        }
    }
}

/// Execute a notebook.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut notebook =
        Notebook::read_from_file(&args.notebook).map_err(nbrun_core::Error::from)?;
    tracing::info!("Running {}", args.notebook.display());

    let config = args.kernel_config();
    let session = KernelSession::start(&config)?;

    let mut runner = NotebookRunner::new(session)
        .with_callback(TracingCallback)
        .with_poll_timeout(config.poll_timeout);
    let options = RunOptions {
        skip_exceptions: args.skip_exceptions,
        autosave: args.autosave.clone(),
    };

    let result = runner.run_notebook(&mut notebook, &options);

    // The document is written even when a cell failed.
    write_result(&notebook, args.destination())?;

    if let Err(e) = runner.into_kernel().shutdown() {
        tracing::warn!("Kernel did not shut down cleanly: {}", e);
    }

    let summary = result?;
    report(&summary, start);
    Ok(())
}

fn write_result(notebook: &Notebook, destination: Option<PathBuf>) -> anyhow::Result<()> {
    match destination {
        Some(path) => nbrun_format::save(notebook, &path).map_err(nbrun_core::Error::from)?,
        None => {
            let json = notebook.to_json_string().map_err(nbrun_core::Error::from)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn report(summary: &RunSummary, start: Instant) {
    if summary.failed.is_empty() {
        tracing::info!(
            "Completed {} cells in {:.2}s",
            summary.executed,
            start.elapsed().as_secs_f64()
        );
    } else {
        tracing::warn!(
            "Completed {} cells in {:.2}s, {} raised exceptions (cells {:?})",
            summary.executed,
            start.elapsed().as_secs_f64(),
            summary.failed.len(),
            summary.failed
        );
    }
}
