//! Suite scheduling
//!
//! Loads scenario files, selects scenarios by tag and runs them with bounded
//! parallelism, each in its own fixture and under its own wall-clock budget.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::driver::{ContextKind, Driver, HttpDriver, UiDriver};
use crate::fixture::FixtureManager;
use crate::observation::display_value;
use crate::scenario::{Scenario, ScenarioResult, ScenarioRunner, ScenarioStatus, StepOutcome, StepStatus, Suite};

/// How a suite is run
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    /// Scenarios must carry at least one of these tags (empty: all)
    pub tags: Vec<String>,
    pub concurrency: usize,
    pub scenario_timeout: Duration,
    /// Print every step as scenarios finish
    pub verbose: bool,
}

impl SuiteOptions {
    pub fn from_config(config: &Config, tags: Vec<String>, verbose: bool) -> Self {
        Self {
            tags,
            concurrency: config.suite.concurrency.max(1),
            scenario_timeout: Duration::from_secs(config.suite.scenario_timeout_secs),
            verbose,
        }
    }

    fn selects(&self, scenario: &Scenario) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|t| scenario.has_tag(t))
    }
}

fn is_scenario_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

/// Expand directories into the scenario files below them, sorted
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_dir(path, &mut files)?;
        } else if path.exists() {
            files.push(path.clone());
        } else {
            return Err(Error::FileRead {
                path: path.display().to_string(),
                error: "no such file or directory".to_string(),
            });
        }
    }
    Ok(files)
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_dir(&path, files)?;
        } else if is_scenario_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Load every scenario file under `paths`
pub fn load_suites(paths: &[PathBuf]) -> Result<Vec<Suite>> {
    collect_files(paths)?.iter().map(|path| Suite::load(path)).collect()
}

/// Run the selected scenarios of all suites
///
/// Results are returned in completion order. Ctrl-C cancels every running
/// scenario; their fixtures are still released.
pub async fn run(config: &Config, suites: &[Suite], options: &SuiteOptions) -> Result<Vec<ScenarioResult>> {
    let manager = FixtureManager::from_config(config);
    let http = HttpDriver::new(config.http.base_url.clone(), config.http.request_timeout());
    let ui = UiDriver::new(config.ui.origin.clone(), config.polling.policy());
    let base = ScenarioRunner::new(config.polling.policy());

    let mut jobs = Vec::new();
    for suite in suites {
        let hooks = Arc::new(suite.hooks.clone());
        for scenario in suite.scenarios.iter().filter(|s| options.selects(s)) {
            jobs.push((base.clone().with_hooks(Arc::clone(&hooks)), scenario));
        }
    }
    if jobs.is_empty() {
        return Err(Error::Configuration("No scenarios selected".to_string()));
    }

    tracing::info!(scenarios = jobs.len(), concurrency = options.concurrency, "Running suite");

    let interrupt = CancellationToken::new();
    let watcher = {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; cancelling running scenarios");
                interrupt.cancel();
            }
        })
    };

    let results = stream::iter(jobs)
        .map(|(runner, scenario)| {
            let cancel = interrupt.child_token();
            let runner = runner.with_cancellation(cancel.clone());
            let driver: &dyn Driver = match scenario.context {
                ContextKind::Http => &http,
                ContextKind::Ui => &ui,
            };
            let manager = &manager;
            let budget = options.scenario_timeout;
            async move {
                let run = manager.run_isolated(&runner, scenario, driver);
                tokio::pin!(run);
                tokio::select! {
                    result = &mut run => result,
                    _ = tokio::time::sleep(budget) => {
                        tracing::warn!(scenario = %scenario.id, "Scenario exceeded its time budget");
                        cancel.cancel();
                        run.await
                    }
                }
            }
        })
        .buffer_unordered(options.concurrency)
        .inspect(|result| print_result(result, options.verbose))
        .collect::<Vec<_>>()
        .await;

    watcher.abort();

    let stats = manager.stats();
    tracing::debug!(
        acquired = stats.acquired(),
        released = stats.released(),
        leaked = stats.leaked(),
        "Fixture totals"
    );

    Ok(results)
}

/// One line per scenario, plus failure detail
pub fn print_result(result: &ScenarioResult, verbose: bool) {
    let duration = format!("({} ms)", result.duration_ms).dimmed();
    match result.status {
        ScenarioStatus::Passed => println!("{} {} {}", "✓".green(), result.id, duration),
        ScenarioStatus::Failed => {
            println!("{} {} {}", "✗".red(), result.id.red(), duration);
            if let Some(outcome) = result.failure() {
                print_failure(outcome);
            }
        }
        ScenarioStatus::Errored => {
            println!("{} {} {}", "!".yellow().bold(), result.id.yellow(), duration);
            if let Some(error) = &result.error {
                println!("    [{}] {}", error.category, error.message);
            }
        }
    }

    if verbose {
        for (phase, outcomes) in [("setup", &result.setup), ("step", &result.steps), ("teardown", &result.teardown)] {
            for outcome in outcomes {
                print_outcome(phase, outcome);
            }
        }
    }
}

fn print_failure(outcome: &StepOutcome) {
    println!("    Step {}: {}", outcome.index, outcome.step);
    if let Some(assertion) = &outcome.assertion {
        println!("    {}", assertion.message);
        println!("      expected: {}", display_value(&assertion.expected).green());
        println!("      actual:   {}", display_value(&assertion.actual).red());
    }
}

fn print_outcome(phase: &str, outcome: &StepOutcome) {
    let mark = match outcome.status {
        StepStatus::Passed => "✓".green(),
        StepStatus::Failed => "✗".red(),
        StepStatus::Errored => "!".yellow(),
    };
    let retries = if outcome.attempts > 1 {
        format!(" [{} attempts]", outcome.attempts).dimmed().to_string()
    } else {
        String::new()
    };
    println!(
        "      {} {} {}: {}{}",
        mark,
        phase.dimmed(),
        outcome.index,
        outcome.step,
        retries
    );
}

/// Totals line; true when every scenario passed
pub fn print_summary(results: &[ScenarioResult]) -> bool {
    let passed = results.iter().filter(|r| r.status == ScenarioStatus::Passed).count();
    let failed = results.iter().filter(|r| r.status == ScenarioStatus::Failed).count();
    let errored = results.iter().filter(|r| r.status == ScenarioStatus::Errored).count();

    println!();
    let line = format!(
        "{} passed, {} failed, {} errored ({} total)",
        passed,
        failed,
        errored,
        results.len()
    );
    if failed + errored == 0 {
        println!("{}", line.green().bold());
        true
    } else {
        println!("{}", line.red().bold());
        false
    }
}
