//! WebDriver backend for the UI driver
//!
//! Speaks the W3C WebDriver protocol to chromedriver, geckodriver or a
//! Selenium server. Every launch creates a new remote session.

mod client;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::config::UiConfig;
use crate::common::Result;
use crate::driver::{Browser, BrowserLauncher};

pub use client::WebDriverClient;
pub use types::{capabilities, ELEMENT_KEY};

/// Launches one WebDriver session per call
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    endpoint: String,
    capabilities: Value,
    command_timeout: Duration,
}

impl WebDriverLauncher {
    pub fn new(endpoint: impl Into<String>, capabilities: Value, command_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            capabilities,
            command_timeout,
        }
    }

    pub fn from_config(config: &UiConfig) -> Self {
        Self::new(
            config.webdriver_url.clone(),
            capabilities(&config.browser, config.headless, &config.args),
            config.command_timeout(),
        )
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn Browser>> {
        let client = WebDriverClient::new_session(
            &self.endpoint,
            self.capabilities.clone(),
            self.command_timeout,
        )
        .await?;
        Ok(Box::new(client))
    }
}
