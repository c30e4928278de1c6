//! nbrun CLI - run notebooks headlessly against a kernel.

mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nbrun")]
#[command(about = "Run every code cell of a notebook and save the outputs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notebook headlessly
    Run {
        /// Path to the notebook (.ipynb file)
        notebook: PathBuf,

        /// Write the executed notebook here (default: stdout)
        #[arg(short, long, conflicts_with = "overwrite")]
        output: Option<PathBuf>,

        /// Write the executed notebook back to the input file
        #[arg(long)]
        overwrite: bool,

        /// Keep running after a cell raises an exception
        #[arg(long)]
        skip_exceptions: bool,

        /// Save progress here after every output and every cell
        #[arg(long)]
        autosave: Option<PathBuf>,

        /// Kernel executable (default: $NBRUN_KERNEL or nbrun-kernel on PATH)
        #[arg(long)]
        kernel: Option<PathBuf>,

        /// Extra argument for the kernel process (repeatable)
        #[arg(long = "kernel-arg", allow_hyphen_values = true)]
        kernel_args: Vec<String>,

        /// Code executed once before the first cell
        #[arg(long)]
        startup_code: Option<String>,

        /// Wait per output poll, in milliseconds
        #[arg(long)]
        poll_timeout_ms: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format nbrun-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<nbrun_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Run {
            notebook,
            output,
            overwrite,
            skip_exceptions,
            autosave,
            kernel,
            kernel_args,
            startup_code,
            poll_timeout_ms,
        } => {
            let args = run::RunArgs {
                notebook,
                output,
                overwrite,
                skip_exceptions,
                autosave,
                kernel,
                kernel_args,
                startup_code,
                poll_timeout_ms,
            };
            run::execute(args).map_err(format_error)?;
        }
    }

    Ok(())
}
