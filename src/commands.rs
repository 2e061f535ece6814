//! CLI command definitions
//!
//! Defines the clap commands for the scenario CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios and print a summary
    Run {
        /// Scenario files or directories containing *.yaml, *.yml or *.json
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only run scenarios carrying this tag (repeatable)
        #[arg(long, short)]
        tag: Vec<String>,

        /// Scenarios executing at the same time
        #[arg(long, short = 'j')]
        concurrency: Option<usize>,

        /// Configuration file (default: platform config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Base URL for HTTP scenarios
        #[arg(long)]
        base_url: Option<String>,

        /// Origin for UI scenarios
        #[arg(long)]
        origin: Option<String>,

        /// WebDriver server URL
        #[arg(long)]
        webdriver: Option<String>,
    },

    /// Parse and check scenarios without running them
    Validate {
        /// Scenario files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}
