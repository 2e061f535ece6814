//! Scenario data model
//!
//! Defines the data structures for deserializing YAML/JSON scenarios. A file
//! holds either one scenario or a suite with shared named hooks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assertion::{AssertOptions, AssertionKind, Expectation};
use crate::common::{Error, Result};
use crate::driver::{Action, ContextKind, Method};
use crate::locator::Locator;

/// One test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier reported in results
    pub id: String,
    /// Optional description of what the scenario verifies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Which kind of isolated context the scenario runs in
    pub context: ContextKind,
    /// Labels used to select scenarios from the command line
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Steps run before the main sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<Hook>,
    /// Steps run after the main sequence, whatever its outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<Hook>,
    /// The main sequence, executed in declaration order
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Reference to hook steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hook {
    /// Name of a hook defined in the enclosing suite
    Named(String),
    /// Steps written in place
    Inline(Vec<Step>),
}

/// A single step in the execution flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Load a page
    Navigate {
        /// Path relative to the UI origin, absolute URL, or "." to reload
        target: String,
        /// Clear cookies and storage of the session before loading
        #[serde(default)]
        reset_storage: bool,
    },
    /// Act on an element
    Interact {
        locator: Locator,
        action: Action,
        /// Text to type or option value to select
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Issue an HTTP request
    Request {
        method: Method,
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
        /// Variable name -> response field path, available to later steps
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        capture: BTreeMap<String, String>,
    },
    /// Check an expectation
    Expect(ExpectStep),
}

/// Expectation as written in a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectStep {
    pub kind: AssertionKind,
    /// Element the expectation is about; absent means the last response
    /// (or the page URL for `url_matches`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
    /// Response field path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Compare this attribute of each match instead of its text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub options: AssertOptions,
}

impl ExpectStep {
    /// Whether the subject is UI state that may still be settling
    pub fn is_eventual(&self) -> bool {
        self.locator.is_some() || self.kind == AssertionKind::UrlMatches
    }

    pub fn to_expectation(&self) -> Expectation {
        Expectation {
            kind: self.kind,
            field: self.field.clone(),
            expected: self.expected.clone(),
            options: self.options.clone(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.kind.needs_element() && self.locator.is_none() {
            return Err(format!("{} needs a locator", self.kind));
        }
        if self.kind.needs_response() && self.locator.is_some() {
            return Err(format!("{} applies to a response, not to a locator", self.kind));
        }
        if self.kind == AssertionKind::UrlMatches {
            if self.locator.is_some() {
                return Err("url_matches does not take a locator".to_string());
            }
            // Patterns containing variables are checked after interpolation.
            if let Some(pattern) = self.expected.as_str().filter(|p| !p.contains("${")) {
                Regex::new(pattern).map_err(|e| format!("invalid URL pattern: {}", e))?;
            }
        }
        if matches!(self.kind, AssertionKind::StatusEquals | AssertionKind::CountEquals)
            && !self.expected.is_u64()
            && !self.expected.as_str().is_some_and(|s| s.contains("${"))
        {
            return Err(format!("{} expects an integer", self.kind));
        }
        if self.kind == AssertionKind::NumericRange
            && self.expected.is_null()
            && self.options.order.is_none()
        {
            return Err("numeric_range needs bounds, a target or an order".to_string());
        }
        Ok(())
    }
}

impl Step {
    /// Whether the step only makes sense in a UI context
    pub fn needs_ui(&self) -> bool {
        match self {
            Step::Navigate { .. } | Step::Interact { .. } => true,
            Step::Request { .. } => false,
            Step::Expect(expect) => expect.is_eventual(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Step::Interact { action, value, .. } if action.needs_value() && value.is_none() => {
                Err(format!("{:?} needs a value", action).to_lowercase())
            }
            Step::Expect(expect) => expect.validate(),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Navigate { target, reset_storage } => {
                write!(f, "navigate {}", target)?;
                if *reset_storage {
                    f.write_str(" (reset storage)")?;
                }
                Ok(())
            }
            Step::Interact { locator, action, value } => {
                write!(f, "{} {}", format!("{:?}", action).to_lowercase(), locator)?;
                if let Some(value) = value {
                    write!(f, " = {:?}", value)?;
                }
                Ok(())
            }
            Step::Request { method, path, .. } => {
                let method: reqwest::Method = (*method).into();
                write!(f, "{} {}", method, path)
            }
            Step::Expect(expect) => {
                write!(f, "expect {}", expect.kind)?;
                if let Some(locator) = &expect.locator {
                    write!(f, " on {}", locator)?;
                }
                if let Some(field) = &expect.field {
                    write!(f, " of {}", field)?;
                }
                Ok(())
            }
        }
    }
}

/// Named hooks shared by the scenarios of one file
pub type HookTable = BTreeMap<String, Vec<Step>>;

/// File format holding several scenarios
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub hooks: HookTable,
    pub scenarios: Vec<Scenario>,
}

/// Scenarios loaded from one file
#[derive(Debug, Clone)]
pub struct Suite {
    pub path: PathBuf,
    pub hooks: HookTable,
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// Load a suite (or a single scenario) from a YAML or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let document: Value = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Self::from_value(path, document)
    }

    /// Build from a parsed document
    pub fn from_value(path: &Path, document: Value) -> Result<Self> {
        let suite = if document.get("scenarios").is_some() {
            serde_json::from_value::<SuiteFile>(document)
        } else {
            serde_json::from_value::<Scenario>(document).map(|scenario| SuiteFile {
                hooks: HookTable::new(),
                scenarios: vec![scenario],
            })
        }
        .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            hooks: suite.hooks,
            scenarios: suite.scenarios,
        })
    }

    /// Parse from YAML text (JSON is accepted too)
    pub fn from_yaml(path: &Path, content: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(content)?;
        Self::from_value(path, document)
    }

    /// Check every scenario, returning one message per problem
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = BTreeSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.id.as_str()) {
                problems.push(format!("{}: duplicate scenario id", scenario.id));
            }
            if let Err(e) = scenario.validate(&self.hooks) {
                problems.push(e.to_string());
            }
        }
        problems
    }
}

impl Scenario {
    /// Look up the steps behind a hook reference
    pub fn hook_steps<'a>(&'a self, hook: Option<&'a Hook>, hooks: &'a HookTable) -> Result<&'a [Step]> {
        match hook {
            None => Ok(&[]),
            Some(Hook::Inline(steps)) => Ok(steps),
            Some(Hook::Named(name)) => hooks.get(name).map(Vec::as_slice).ok_or_else(|| {
                Error::Configuration(format!("{}: unknown hook '{}'", self.id, name))
            }),
        }
    }

    /// Static checks: non-empty, known hooks, well-formed steps that fit the
    /// context kind
    pub fn validate(&self, hooks: &HookTable) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Configuration(format!("{}: scenario has no steps", self.id)));
        }

        let setup = self.hook_steps(self.setup.as_ref(), hooks)?;
        let teardown = self.hook_steps(self.teardown.as_ref(), hooks)?;

        let phases = [("setup", setup), ("steps", self.steps.as_slice()), ("teardown", teardown)];
        for (phase, steps) in phases {
            for (index, step) in steps.iter().enumerate() {
                if let Err(reason) = step.validate() {
                    return Err(Error::Configuration(format!(
                        "{}: {}[{}] ({}): {}",
                        self.id, phase, index, step, reason
                    )));
                }
                if self.context == ContextKind::Http && step.needs_ui() {
                    return Err(Error::Configuration(format!(
                        "{}: {}[{}] ({}) needs a ui context",
                        self.id, phase, index, step
                    )));
                }
                if self.context == ContextKind::Ui && matches!(step, Step::Request { .. }) {
                    return Err(Error::Configuration(format!(
                        "{}: {}[{}] ({}) needs an http context",
                        self.id, phase, index, step
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
