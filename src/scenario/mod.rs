//! Scenarios: the data model and the runner that executes it

mod model;
mod runner;
mod vars;

pub use model::{ExpectStep, Hook, HookTable, Scenario, Step, Suite, SuiteFile};
pub use runner::{ScenarioResult, ScenarioRunner, ScenarioStatus, StepOutcome, StepStatus};
pub use vars::Variables;
