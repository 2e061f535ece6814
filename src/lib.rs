//! Scenario CLI - a scenario execution engine for HTTP APIs and web UIs
//!
//! Scenarios are data: ordered steps that navigate, interact, issue
//! requests and check expectations. The engine drives them through a
//! capability-polymorphic [`driver::Driver`], waits for eventually-true UI
//! state with bounded polling, isolates every scenario in a fresh fixture
//! and classifies each run as passed, failed or errored.

pub mod assertion;
pub mod cli;
pub mod commands;
pub mod common;
pub mod driver;
pub mod fixture;
pub mod locator;
pub mod observation;
pub mod scenario;
pub mod wait;
pub mod webdriver;

// Re-export commonly used types for tests
pub use common::{Error, ErrorCategory, Result};
pub use fixture::{Fixture, FixtureManager};
pub use scenario::{Scenario, ScenarioResult, ScenarioRunner, ScenarioStatus};
