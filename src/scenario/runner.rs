//! Scenario runner
//!
//! Executes one scenario's setup hook, steps and teardown hook in order
//! against a driver and an acquired fixture, and folds the step outcomes
//! into a single [`ScenarioResult`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::assertion::{self, AssertionResult};
use crate::common::{Error, ErrorCategory, ErrorReport, Result};
use crate::driver::{Context, Driver, HttpRequest, Probe};
use crate::fixture::Fixture;
use crate::observation::Observation;
use crate::wait::{self, Attempt, PollPolicy, Polled};

use super::model::{ExpectStep, HookTable, Scenario, Step};
use super::vars::Variables;

/// Terminal status of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Every step passed
    Passed,
    /// The system under test did not meet an expectation
    Failed,
    /// The harness could not complete the check
    Errored,
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioStatus::Passed => f.write_str("passed"),
            ScenarioStatus::Failed => f.write_str("failed"),
            ScenarioStatus::Errored => f.write_str("errored"),
        }
    }
}

/// Status of one executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Errored,
}

/// Record of one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Position within its phase
    pub index: usize,
    /// Human readable step summary
    pub step: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<AssertionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    /// Observations taken before the verdict (1 unless retried)
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Terminal record of one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub id: String,
    pub status: ScenarioStatus,
    /// Setup hook outcomes
    pub setup: Vec<StepOutcome>,
    /// One outcome per executed main step
    pub steps: Vec<StepOutcome>,
    /// Teardown hook outcomes
    pub teardown: Vec<StepOutcome>,
    /// Index of the main step that failed or errored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    pub duration_ms: u64,
}

impl ScenarioResult {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: ScenarioStatus::Passed,
            setup: Vec::new(),
            steps: Vec::new(),
            teardown: Vec::new(),
            failed_step: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// A run that ended before any step executed
    pub fn errored(id: &str, error: &Error, elapsed: Duration) -> Self {
        Self {
            status: ScenarioStatus::Errored,
            error: Some(error.into()),
            duration_ms: elapsed.as_millis() as u64,
            ..Self::new(id)
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// Outcome of the failing main step, if any
    pub fn failure(&self) -> Option<&StepOutcome> {
        self.failed_step.and_then(|index| self.steps.get(index))
    }

    /// Classification of an errored run
    pub fn category(&self) -> Option<ErrorCategory> {
        self.error.as_ref().map(|e| e.category)
    }
}

/// What executing a step produced
struct Executed {
    observation: Option<Observation>,
    assertion: Option<AssertionResult>,
    attempts: u32,
}

impl Executed {
    fn observed(observation: Observation) -> Self {
        Self {
            observation: Some(observation),
            assertion: None,
            attempts: 1,
        }
    }
}

/// Why a phase stopped early
enum Halt {
    Failed { index: usize, message: String },
    Errored { index: usize, error: Error },
}

impl Halt {
    fn is_cancelled(&self) -> bool {
        matches!(self, Halt::Errored { error: Error::Cancelled, .. })
    }

    /// Report for a halt inside a hook, where any failure is a harness error
    fn hook_report(&self, phase: &str) -> ErrorReport {
        match self {
            Halt::Failed { index, message } => ErrorReport {
                category: ErrorCategory::Environment,
                message: format!("{} step {} failed: {}", phase, index, message),
            },
            Halt::Errored { error: Error::Cancelled, .. } => ErrorReport::from(&Error::Cancelled),
            Halt::Errored { index, error } => ErrorReport {
                category: error.category(),
                message: format!("{} step {}: {}", phase, index, error),
            },
        }
    }
}

/// Mutable state threaded through the steps of one run
struct RunState {
    vars: Variables,
    last_response: Option<Observation>,
}

/// Runs scenarios one at a time; cheap to clone per scenario
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    policy: PollPolicy,
    hooks: Arc<HookTable>,
    cancel: CancellationToken,
}

impl ScenarioRunner {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            hooks: Arc::new(HookTable::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Named hooks the scenarios may reference
    pub fn with_hooks(mut self, hooks: Arc<HookTable>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Token that cancels the run when triggered
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Run one scenario against an acquired fixture
    ///
    /// Fails only for scenarios that cannot run at all (no steps, unknown
    /// hook, released fixture). Everything that happens once execution
    /// starts is reported through the returned result.
    pub async fn run(&self, scenario: &Scenario, driver: &dyn Driver, fixture: &Fixture) -> Result<ScenarioResult> {
        if scenario.steps.is_empty() {
            return Err(Error::Configuration(format!(
                "Scenario '{}' has no steps",
                scenario.id
            )));
        }
        let setup = scenario.hook_steps(scenario.setup.as_ref(), &self.hooks)?;
        let teardown = scenario.hook_steps(scenario.teardown.as_ref(), &self.hooks)?;
        let ctx = fixture.context()?;

        let started = Instant::now();
        let mut state = RunState {
            vars: Variables::for_run(),
            last_response: None,
        };
        let mut result = ScenarioResult::new(&scenario.id);
        let mut cancelled = false;

        tracing::info!(scenario = %scenario.id, context = %scenario.context, driver = driver.name(), "Running scenario");

        if let Some(halt) = self.run_phase("setup", setup, driver, ctx, &mut state, &mut result.setup).await {
            cancelled = halt.is_cancelled();
            tracing::warn!(scenario = %scenario.id, "Setup did not complete; skipping steps");
            result.status = ScenarioStatus::Errored;
            result.error = Some(halt.hook_report("setup"));
        } else if let Some(halt) = self
            .run_phase("steps", &scenario.steps, driver, ctx, &mut state, &mut result.steps)
            .await
        {
            cancelled = halt.is_cancelled();
            match halt {
                Halt::Failed { index, .. } => {
                    result.status = ScenarioStatus::Failed;
                    result.failed_step = Some(index);
                }
                Halt::Errored { index, error } => {
                    result.status = ScenarioStatus::Errored;
                    result.failed_step = Some(index);
                    result.error = Some(ErrorReport::from(&error));
                }
            }
        }

        if cancelled || self.cancel.is_cancelled() {
            tracing::warn!(scenario = %scenario.id, "Scenario cancelled; skipping teardown");
            if result.passed() {
                result.status = ScenarioStatus::Errored;
                result.error = Some(ErrorReport::from(&Error::Cancelled));
            }
        } else if let Some(halt) = self
            .run_phase("teardown", teardown, driver, ctx, &mut state, &mut result.teardown)
            .await
        {
            // Teardown never masks an earlier verdict.
            if result.passed() {
                result.status = ScenarioStatus::Errored;
                result.error = Some(halt.hook_report("teardown"));
            } else {
                tracing::warn!(scenario = %scenario.id, "Teardown also failed");
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            scenario = %scenario.id,
            status = %result.status,
            duration_ms = result.duration_ms,
            "Scenario finished"
        );
        Ok(result)
    }

    /// Execute steps in order until one does not pass
    async fn run_phase(
        &self,
        phase: &str,
        steps: &[Step],
        driver: &dyn Driver,
        ctx: &Context,
        state: &mut RunState,
        outcomes: &mut Vec<StepOutcome>,
    ) -> Option<Halt> {
        for (index, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Some(Halt::Errored {
                    index,
                    error: Error::Cancelled,
                });
            }

            tracing::debug!(phase, index, step = %step, "Executing step");
            let started = Instant::now();
            let executed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                executed = self.execute(step, driver, ctx, state) => executed,
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let (outcome, halt) = match executed {
                Ok(executed) => {
                    let failed = executed.assertion.as_ref().filter(|a| !a.passed).map(|a| a.message.clone());
                    let outcome = StepOutcome {
                        index,
                        step: step.to_string(),
                        status: if failed.is_some() { StepStatus::Failed } else { StepStatus::Passed },
                        observation: executed.observation,
                        assertion: executed.assertion,
                        error: None,
                        attempts: executed.attempts,
                        duration_ms,
                    };
                    (outcome, failed.map(|message| Halt::Failed { index, message }))
                }
                Err(error) => {
                    tracing::debug!(phase, index, error = %error, "Step errored");
                    let outcome = StepOutcome {
                        index,
                        step: step.to_string(),
                        status: StepStatus::Errored,
                        observation: None,
                        assertion: None,
                        error: Some(ErrorReport::from(&error)),
                        attempts: 1,
                        duration_ms,
                    };
                    (outcome, Some(Halt::Errored { index, error }))
                }
            };

            outcomes.push(outcome);
            if halt.is_some() {
                return halt;
            }
        }
        None
    }

    async fn execute(&self, step: &Step, driver: &dyn Driver, ctx: &Context, state: &mut RunState) -> Result<Executed> {
        match step {
            Step::Navigate { target, reset_storage } => {
                let target = state.vars.interpolate(target)?;
                let observation = driver.navigate(ctx, &target, *reset_storage).await?;
                Ok(Executed::observed(observation))
            }
            Step::Interact { locator, action, value } => {
                let value = value.as_deref().map(|v| state.vars.interpolate(v)).transpose()?;
                let observation = driver.interact(ctx, locator, *action, value.as_deref()).await?;
                Ok(Executed::observed(observation))
            }
            Step::Request {
                method,
                path,
                body,
                headers,
                capture,
            } => {
                let request = HttpRequest {
                    method: *method,
                    path: state.vars.interpolate(path)?,
                    body: body.as_ref().map(|b| state.vars.interpolate_value(b)).transpose()?,
                    headers: state.vars.interpolate_map(headers)?,
                };
                let observation = driver.issue(ctx, &request).await?;

                if let Observation::Response(response) = &observation {
                    for (name, path) in capture {
                        let value = response.field(path).map(|f| f.to_value()).ok_or_else(|| {
                            Error::Configuration(format!(
                                "Cannot capture '{}': field '{}' is missing from the response",
                                name, path
                            ))
                        })?;
                        tracing::debug!(variable = %name, %value, "Captured variable");
                        state.vars.set(name.clone(), value);
                    }
                }

                state.last_response = Some(observation.clone());
                Ok(Executed::observed(observation))
            }
            Step::Expect(expect) => self.expect(expect, driver, ctx, state).await,
        }
    }

    async fn expect(&self, expect: &ExpectStep, driver: &dyn Driver, ctx: &Context, state: &RunState) -> Result<Executed> {
        let mut expectation = expect.to_expectation();
        expectation.expected = state.vars.interpolate_value(&expectation.expected)?;
        if let Some(field) = &expect.field {
            expectation.field = Some(state.vars.interpolate(field)?);
        }

        if !expect.is_eventual() {
            // Responses are immutable once received, so one evaluation is final.
            let observation = state.last_response.clone().ok_or_else(|| {
                Error::Configuration(format!("{} has no preceding request to check", expect.kind))
            })?;
            let result = assertion::evaluate(&expectation, &observation);
            return Ok(Executed {
                observation: Some(observation),
                assertion: Some(result),
                attempts: 1,
            });
        }

        let probe = match &expect.locator {
            Some(locator) => Probe::Element {
                locator: locator.clone(),
                attribute: expect.attribute.clone(),
            },
            None => Probe::Url,
        };
        let policy = match expect.options.timeout_ms {
            Some(ms) => self.policy.with_timeout(Duration::from_millis(ms)),
            None => self.policy,
        };
        let what = match &expect.locator {
            Some(locator) => format!("{} on '{}'", expect.kind, locator),
            None => expect.kind.to_string(),
        };

        let probe = &probe;
        let expectation = &expectation;
        let by_attribute = expect.attribute.is_some();
        // Latest judged snapshot, kept across stale looks
        let judged: Mutex<Option<(Observation, AssertionResult)>> = Mutex::new(None);
        let judged = &judged;
        let polled = wait::poll(&policy, &what, move || async move {
            let mut observation = match driver.observe(ctx, probe).await {
                Ok(observation) => observation,
                Err(Error::StaleElement(detail)) => {
                    tracing::debug!(%detail, "Page re-rendered during observation");
                    return Ok(Attempt::Pending(None));
                }
                Err(e) => return Err(e),
            };
            if by_attribute {
                observation = attribute_view(observation);
            }
            let result = assertion::evaluate(expectation, &observation);
            if result.passed {
                return Ok(Attempt::Ready((observation, result)));
            }
            if let Ok(mut slot) = judged.lock() {
                *slot = Some((observation.clone(), result.clone()));
            }
            Ok(Attempt::Pending(Some((observation, result))))
        })
        .await?;
        let judged = judged.lock().ok().and_then(|mut slot| slot.take());

        let ((observation, result), attempts) = match polled {
            Polled::Ready { value, attempts } => (value, attempts),
            Polled::Exhausted {
                last,
                attempts,
                elapsed,
            } => match last.or(judged) {
                Some(last) => {
                    tracing::debug!(%what, attempts, elapsed_ms = elapsed.as_millis() as u64, "Expectation never held");
                    (last, attempts)
                }
                // Never settled on a snapshot to judge
                None => {
                    return Err(Error::timeout(format!("{} (page kept re-rendering)", what), elapsed));
                }
            },
        };

        Ok(Executed {
            observation: Some(observation),
            assertion: Some(result),
            attempts,
        })
    }
}

/// Replace element texts with the attribute values that were read
fn attribute_view(observation: Observation) -> Observation {
    match observation {
        Observation::Elements(mut snapshot) => {
            snapshot.texts = snapshot
                .attributes
                .iter()
                .map(|a| a.clone().unwrap_or_default())
                .collect();
            Observation::Elements(snapshot)
        }
        other => other,
    }
}
