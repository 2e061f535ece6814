//! Error types for the scenario engine
//!
//! Every error maps onto an [`ErrorCategory`], the classification recorded in
//! a scenario result. Assertion mismatches are not errors: they are carried
//! as [`crate::assertion::AssertionResult`] values.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario engine
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("{driver} driver does not support '{operation}'")]
    UnsupportedOperation {
        driver: &'static str,
        operation: &'static str,
    },

    #[error("Invalid locator '{input}': {reason}")]
    InvalidLocator { input: String, reason: String },

    #[error("Locator '{locator}' matched {count} elements, expected exactly one")]
    AmbiguousLocator { locator: String, count: usize },

    #[error("Unknown variable '${{{0}}}'")]
    UnknownVariable(String),

    // === Timeout Errors ===
    #[error("Timed out after {elapsed_ms} ms waiting for {what}")]
    Timeout { what: String, elapsed_ms: u64 },

    #[error("Element '{locator}' not found after {waited_ms} ms")]
    ElementNotFound { locator: String, waited_ms: u64 },

    // === Environment Errors ===
    #[error("Environment error: {0}")]
    Environment(String),

    // === Transport Errors ===
    #[error("Network error: {0}")]
    Network(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("WebDriver command '{command}' failed: {error}: {message}")]
    WebDriver {
        command: String,
        error: String,
        message: String,
    },

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    // === Lifecycle ===
    #[error("Scenario cancelled")]
    Cancelled,

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a timeout error for a named wait
    pub fn timeout(what: impl Into<String>, elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(driver: &'static str, operation: &'static str) -> Self {
        Self::UnsupportedOperation { driver, operation }
    }

    /// Create an invalid locator error
    pub fn invalid_locator(input: &str, reason: &str) -> Self {
        Self::InvalidLocator {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a WebDriver command failure
    pub fn webdriver(command: &str, error: &str, message: &str) -> Self {
        Self::WebDriver {
            command: command.to_string(),
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    /// Map a reqwest failure onto timeout or network errors
    pub fn from_http(what: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                what: what.to_string(),
                elapsed_ms: 0,
            }
        } else {
            Self::Network(format!("{}: {}", what, err))
        }
    }

    /// Classification used in scenario results
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration(_)
            | Error::ConfigParse(_)
            | Error::UnsupportedOperation { .. }
            | Error::InvalidLocator { .. }
            | Error::AmbiguousLocator { .. }
            | Error::UnknownVariable(_)
            | Error::FileRead { .. }
            | Error::Yaml(_) => ErrorCategory::Configuration,
            Error::Timeout { .. } | Error::ElementNotFound { .. } => ErrorCategory::Timeout,
            Error::Environment(_) | Error::Io(_) => ErrorCategory::Environment,
            Error::Network(_) => ErrorCategory::Network,
            Error::Driver(_)
            | Error::WebDriver { .. }
            | Error::StaleElement(_)
            | Error::Json(_) => ErrorCategory::Driver,
            Error::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

/// Serializable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Timeout,
    Environment,
    Network,
    Driver,
    Cancelled,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Environment => "environment",
            ErrorCategory::Network => "network",
            ErrorCategory::Driver => "driver",
            ErrorCategory::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Error as recorded in a scenario result
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&Error> for ErrorReport {
    fn from(e: &Error) -> Self {
        Self {
            category: e.category(),
            message: e.to_string(),
        }
    }
}
