//! Drivers translate steps into interaction with the system under test
//!
//! Both variants implement one capability set. Operations a variant does not
//! support fail with [`Error::UnsupportedOperation`], so a scenario that
//! mixes UI steps into an HTTP context is reported as a configuration error
//! rather than as a later assertion failure.

pub mod browser;
pub mod http;
pub mod ui;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};
use crate::locator::Locator;
use crate::observation::Observation;

pub use browser::{Browser, BrowserLauncher, By, ElementRef};
pub use http::{HttpContext, HttpDriver};
pub use ui::{UiDriver, UiSession};

/// Kind of isolated execution environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Http,
    Ui,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Http => f.write_str("http"),
            ContextKind::Ui => f.write_str("ui"),
        }
    }
}

/// A live execution context, owned by exactly one scenario run
pub enum Context {
    Http(HttpContext),
    Ui(UiSession),
}

impl Context {
    pub fn kind(&self) -> ContextKind {
        match self {
            Context::Http(_) => ContextKind::Http,
            Context::Ui(_) => ContextKind::Ui,
        }
    }

    pub fn as_http(&self) -> Result<&HttpContext> {
        match self {
            Context::Http(ctx) => Ok(ctx),
            other => Err(Error::Configuration(format!(
                "HTTP driver handed a {} context",
                other.kind()
            ))),
        }
    }

    pub fn as_ui(&self) -> Result<&UiSession> {
        match self {
            Context::Ui(session) => Ok(session),
            other => Err(Error::Configuration(format!(
                "UI driver handed a {} context",
                other.kind()
            ))),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.kind()).finish()
    }
}

/// Element interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Click,
    /// Clear the field, then type the value
    Fill,
    Clear,
    /// Pick the `<option>` whose value attribute equals the value
    Select,
}

impl Action {
    pub fn needs_value(&self) -> bool {
        matches!(self, Action::Fill | Action::Select)
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

/// A request ready to issue (variables already substituted)
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

/// What to observe on a page
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// Matches of a locator, optionally reading one attribute of each
    Element {
        locator: Locator,
        attribute: Option<String>,
    },
    /// The current URL
    Url,
}

/// Capability set shared by every driver
///
/// The context is passed explicitly to every call; drivers hold only
/// configuration (endpoint, origin, poll policy).
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name used in error messages
    fn name(&self) -> &'static str;

    /// Load a page; `reset_storage` first clears the session's stored state
    async fn navigate(&self, _ctx: &Context, _target: &str, _reset_storage: bool) -> Result<Observation> {
        Err(Error::unsupported(self.name(), "navigate"))
    }

    async fn interact(
        &self,
        _ctx: &Context,
        _locator: &Locator,
        _action: Action,
        _value: Option<&str>,
    ) -> Result<Observation> {
        Err(Error::unsupported(self.name(), "interact"))
    }

    /// Take one snapshot; waiting is the caller's business
    async fn observe(&self, _ctx: &Context, _probe: &Probe) -> Result<Observation> {
        Err(Error::unsupported(self.name(), "observe"))
    }

    async fn issue(&self, _ctx: &Context, _request: &HttpRequest) -> Result<Observation> {
        Err(Error::unsupported(self.name(), "issue"))
    }
}
