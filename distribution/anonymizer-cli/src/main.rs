//! Anonymizer CLI
//!
//! Administrative tool for sanitizing a copy of a production CMS database:
//! anonymizes users and comment authors, and empties signup, logging and form-entry tables.
//!
//! Exit status: 0 on success, 1 on a fatal error, 2 when some records could not be updated.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use commands::{Cli, RunStatus};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.run() {
        Ok(RunStatus::Clean) => ExitCode::SUCCESS,
        Ok(RunStatus::RecordsFailed) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
