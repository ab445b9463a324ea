//! rebind CLI binary.
//!
//! Entry point of the `rebind` command-line tool. It parses arguments with
//! `clap`, installs the `tracing` subscriber the flags ask for, and dispatches
//! to the command handlers.

mod cli;
mod commands;

use std::sync::Mutex;

use miette::Result;
use rebind_util::errors::RebindError;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::parse();
    init_logging(&args)?;
    commands::dispatch(args)
}

/// `RUST_LOG` wins; otherwise `warn`, or `debug` with `--verbose`.
fn init_logging(args: &cli::Cli) -> Result<()> {
    let default = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(RebindError::from)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
