//! WebDriver client for one browser session
//!
//! Each instance owns a single remote session created with fresh
//! capabilities, which gives it its own cookie jar and storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::driver::{Browser, By, ElementRef};

use super::types;

/// Client bound to one WebDriver session
pub struct WebDriverClient {
    http: reqwest::Client,
    endpoint: String,
    session_id: String,
    timeout: Duration,
    closed: AtomicBool,
}

impl WebDriverClient {
    /// Create a new session on the WebDriver server
    pub async fn new_session(endpoint: &str, capabilities: Value, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Environment(format!("Failed to build WebDriver client: {}", e)))?;
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let body = json!({"capabilities": {"alwaysMatch": capabilities}});
        let response = http
            .post(format!("{}/session", endpoint))
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_http("new session", e))?;
        let success = response.status().is_success();
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| Error::Driver(format!("Invalid new session response: {}", e)))?;

        // Legacy drivers put sessionId next to value instead of inside it.
        let legacy_id = types::session_id(&envelope);
        let value = types::unwrap_value("new session", success, envelope)?;
        let session_id = types::session_id(&value)
            .or(legacy_id)
            .ok_or_else(|| Error::Driver("New session response has no sessionId".to_string()))?;

        tracing::debug!(%session_id, "WebDriver session created");

        Ok(Self {
            http,
            endpoint,
            session_id,
            timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a session command and unwrap the response value
    async fn command(&self, method: Method, path: &str, body: Option<Value>, name: &str) -> Result<Value> {
        let url = format!("{}/session/{}{}", self.endpoint, self.session_id, path);
        tracing::trace!(command = name, %url, "WebDriver request");

        let mut request = self.http.request(method.clone(), &url).timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(&body);
        } else if method == Method::POST {
            request = request.json(&json!({}));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("WebDriver {}", name), self.timeout)
            } else {
                Error::from_http(name, e)
            }
        })?;
        let success = response.status().is_success();
        let envelope: Value = response
            .json()
            .await
            .map_err(|e| Error::Driver(format!("Invalid {} response: {}", name, e)))?;

        types::unwrap_value(name, success, envelope)
    }

    fn element_path(element: &ElementRef, suffix: &str) -> String {
        format!("/element/{}{}", element.id(), suffix)
    }
}

#[async_trait]
impl Browser for WebDriverClient {
    async fn goto(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({"url": url})), "navigate")
            .await
            .map(|_| ())
    }

    async fn refresh(&self) -> Result<()> {
        self.command(Method::POST, "/refresh", None, "refresh").await.map(|_| ())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.command(Method::GET, "/url", None, "current url").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Driver(format!("Expected URL string, got {}", value)))
    }

    async fn find_elements(&self, scope: Option<&ElementRef>, by: &By) -> Result<Vec<ElementRef>> {
        let path = match scope {
            Some(element) => Self::element_path(element, "/elements"),
            None => "/elements".to_string(),
        };
        let value = self
            .command(Method::POST, &path, Some(types::locator_body(by)), "find elements")
            .await?;
        types::element_refs(&value)
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &Self::element_path(element, "/click"), None, "click")
            .await
            .map(|_| ())
    }

    async fn clear(&self, element: &ElementRef) -> Result<()> {
        self.command(Method::POST, &Self::element_path(element, "/clear"), None, "clear")
            .await
            .map(|_| ())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &Self::element_path(element, "/value"),
            Some(json!({"text": text})),
            "send keys",
        )
        .await
        .map(|_| ())
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/text"), None, "text")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/displayed"), None, "displayed")
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let suffix = format!("/attribute/{}", name);
        let value = self
            .command(Method::GET, &Self::element_path(element, &suffix), None, "attribute")
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Storage is per origin, so only the current page's origin is cleared.
    async fn reset_storage(&self) -> Result<()> {
        self.command(Method::DELETE, "/cookie", None, "delete cookies").await?;
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({
                "script": "window.localStorage.clear(); window.sessionStorage.clear();",
                "args": [],
            })),
            "clear storage",
        )
        .await
        .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        let response = self
            .http
            .delete(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::from_http("delete session", e))?;
        if !response.status().is_success() {
            return Err(Error::Driver(format!(
                "Deleting session {} returned {}",
                self.session_id,
                response.status()
            )));
        }
        tracing::debug!(session_id = %self.session_id, "WebDriver session closed");
        Ok(())
    }
}
