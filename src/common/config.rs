//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::wait::PollPolicy;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// HTTP driver settings
    #[serde(default)]
    pub http: HttpConfig,

    /// UI driver settings
    #[serde(default)]
    pub ui: UiConfig,

    /// Retry/poll budget for eventually-visible UI state
    #[serde(default)]
    pub polling: PollingConfig,

    /// Suite scheduling settings
    #[serde(default)]
    pub suite: SuiteConfig,
}

/// HTTP driver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Base endpoint every request path is joined to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Headers attached to every request of a scenario's context
    #[serde(default = "default_headers")]
    pub default_headers: BTreeMap<String, String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_headers: default_headers(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert("Accept".to_string(), "application/json".to_string());
    headers
}

fn default_request_timeout() -> u64 {
    30_000
}

/// UI driver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    /// Origin relative navigation targets resolve against
    #[serde(default = "default_origin")]
    pub origin: String,

    /// WebDriver endpoint (chromedriver, geckodriver, selenium)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Browser name requested in session capabilities
    #[serde(default = "default_browser")]
    pub browser: String,

    /// Run the browser without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Extra browser command line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for a single WebDriver command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            headless: default_headless(),
            args: Vec::new(),
            command_timeout_ms: default_command_timeout(),
        }
    }
}

impl UiConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_command_timeout() -> u64 {
    30_000
}

/// Poll policy settings
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_poll_timeout")]
    pub timeout_ms: u64,

    /// Optional cap on attempts in addition to the wall-clock budget
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            timeout_ms: default_poll_timeout(),
            max_attempts: None,
        }
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            max_attempts: self.max_attempts,
        }
    }
}

fn default_interval() -> u64 {
    100
}

fn default_poll_timeout() -> u64 {
    5_000
}

/// Suite scheduling settings
#[derive(Debug, Deserialize, Clone)]
pub struct SuiteConfig {
    /// Scenarios executing at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Wall-clock budget for one scenario before it is cancelled
    #[serde(default = "default_scenario_timeout")]
    pub scenario_timeout_secs: u64,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            scenario_timeout_secs: default_scenario_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_scenario_timeout() -> u64 {
    300
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
