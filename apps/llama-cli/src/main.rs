//! Llama CLI binary entry point.
//!
//! Initializes the tracing subscriber, parses command-line arguments with
//! clap, and dispatches to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (log_dir, slug) = cli.log_context();

    // Clean old logs (best-effort, before tracing is initialized).
    if let Some(log_dir) = log_dir.as_deref() {
        logging::cleanup_old_logs(log_dir);
    }

    let _guard = logging::init_tracing(log_dir.as_deref(), &slug)?;

    cli.run()
}
