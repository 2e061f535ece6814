//! Scenario CLI - runs declarative HTTP and UI scenarios
//!
//! Loads scenario files, runs each scenario in its own isolated fixture and
//! prints a pass/fail summary. The exit code is non-zero when any scenario
//! did not pass.

use std::path::PathBuf;

use clap::Parser;
use scenario::{cli, commands::Commands, common::logging};

#[derive(Parser)]
#[command(name = "scenario", about = "Scenario execution engine for HTTP APIs and web UIs")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show step-by-step output and debug logs
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = logging::init_cli(cli.verbose, cli.log_file.as_deref());

    let code = match cli::dispatch(cli.command, cli.verbose).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    // Flush the log file before exiting.
    drop(guard);
    std::process::exit(code);
}
