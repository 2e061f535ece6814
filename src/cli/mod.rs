//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

pub mod suite;

use std::path::Path;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;

/// Dispatch a CLI command; `Ok(false)` means something did not pass
pub async fn dispatch(command: Commands, verbose: bool) -> Result<bool> {
    match command {
        Commands::Run {
            paths,
            tag,
            concurrency,
            config,
            base_url,
            origin,
            webdriver,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(base_url) = base_url {
                config.http.base_url = base_url;
            }
            if let Some(origin) = origin {
                config.ui.origin = origin;
            }
            if let Some(webdriver) = webdriver {
                config.ui.webdriver_url = webdriver;
            }
            if let Some(concurrency) = concurrency {
                config.suite.concurrency = concurrency;
            }

            let suites = suite::load_suites(&paths)?;
            let options = suite::SuiteOptions::from_config(&config, tag, verbose);
            let results = suite::run(&config, &suites, &options).await?;
            Ok(suite::print_summary(&results))
        }

        Commands::Validate { paths } => {
            let files = suite::collect_files(&paths)?;
            let mut ok = true;
            for file in &files {
                match crate::scenario::Suite::load(file) {
                    Ok(loaded) => {
                        let problems = loaded.validate();
                        if problems.is_empty() {
                            println!(
                                "{} {} ({} scenarios)",
                                "✓".green(),
                                file.display(),
                                loaded.scenarios.len()
                            );
                        } else {
                            ok = false;
                            println!("{} {}", "✗".red(), file.display());
                            for problem in problems {
                                println!("    {}", problem);
                            }
                        }
                    }
                    Err(e) => {
                        ok = false;
                        println!("{} {}: {}", "✗".red(), file.display(), e);
                    }
                }
            }
            Ok(ok)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
