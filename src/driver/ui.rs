//! UI driver: manipulates a rendered page through locators

use async_trait::async_trait;

use super::browser::{Browser, By, ElementRef};
use super::{Action, Context, Driver, Probe};
use crate::common::{Error, Result};
use crate::locator::{self, Locator, Resolution};
use crate::observation::{ElementSnapshot, Observation};
use crate::wait::PollPolicy;

/// One isolated browser session
pub struct UiSession {
    browser: Box<dyn Browser>,
}

impl UiSession {
    pub fn new(browser: Box<dyn Browser>) -> Self {
        Self { browser }
    }

    pub fn browser(&self) -> &dyn Browser {
        self.browser.as_ref()
    }
}

/// Driver for page navigation and DOM interaction
#[derive(Debug, Clone)]
pub struct UiDriver {
    origin: String,
    policy: PollPolicy,
}

impl UiDriver {
    pub fn new(origin: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            origin: origin.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Resolve a navigation target against the origin
    pub fn url_for(&self, target: &str) -> String {
        if target.contains("://") {
            return target.to_string();
        }
        let origin = self.origin.trim_end_matches('/');
        let path = target.trim_start_matches('/');
        if path.is_empty() {
            format!("{}/", origin)
        } else {
            format!("{}/{}", origin, path)
        }
    }

    /// Wait for a single actionable element
    async fn locate_one(&self, browser: &dyn Browser, locator: &Locator) -> Result<ElementRef> {
        match locator::resolve(browser, locator, &self.policy).await? {
            Resolution::Found(mut elements) => {
                if elements.len() > 1 && !locator.is_positional() {
                    return Err(Error::AmbiguousLocator {
                        locator: locator.to_string(),
                        count: elements.len(),
                    });
                }
                Ok(elements.swap_remove(0))
            }
            Resolution::NotFound { waited_ms, .. } => Err(Error::ElementNotFound {
                locator: locator.to_string(),
                waited_ms,
            }),
        }
    }

    async fn perform(
        &self,
        browser: &dyn Browser,
        element: &ElementRef,
        action: Action,
        value: &str,
    ) -> Result<()> {
        match action {
            Action::Click => browser.click(element).await,
            Action::Clear => browser.clear(element).await,
            Action::Fill => {
                browser.clear(element).await?;
                browser.send_keys(element, value).await
            }
            Action::Select => {
                let by = By::Css(format!(
                    "option[value=\"{}\"]",
                    value.replace('"', "\\\"")
                ));
                let options = browser.find_elements(Some(element), &by).await?;
                match options.first() {
                    Some(option) => browser.click(option).await,
                    None => Err(Error::Driver(format!("No option with value '{}'", value))),
                }
            }
        }
    }

    async fn snapshot(
        &self,
        browser: &dyn Browser,
        locator: &Locator,
        attribute: Option<&str>,
    ) -> Result<ElementSnapshot> {
        let elements = locator::resolve_now(browser, locator).await?;
        let mut snapshot = ElementSnapshot::empty(locator.as_str());
        for element in &elements {
            snapshot.texts.push(browser.text(element).await?);
            snapshot.visible.push(browser.is_displayed(element).await?);
            if let Some(name) = attribute {
                snapshot.attributes.push(browser.attribute(element, name).await?);
            }
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl Driver for UiDriver {
    fn name(&self) -> &'static str {
        "ui"
    }

    async fn navigate(&self, ctx: &Context, target: &str, reset_storage: bool) -> Result<Observation> {
        let browser = ctx.as_ui()?.browser();

        if reset_storage {
            tracing::debug!("Resetting session storage");
            browser.reset_storage().await?;
        }

        if target.trim() == "." {
            browser.refresh().await?;
        } else {
            let url = self.url_for(target);
            tracing::debug!(%url, "Navigating");
            browser.goto(&url).await?;
        }

        Ok(Observation::Page {
            url: browser.current_url().await?,
        })
    }

    async fn interact(
        &self,
        ctx: &Context,
        locator: &Locator,
        action: Action,
        value: Option<&str>,
    ) -> Result<Observation> {
        let browser = ctx.as_ui()?.browser();
        let value = match (action.needs_value(), value) {
            (true, None) => {
                return Err(Error::Configuration(format!(
                    "{:?} on '{}' requires a value",
                    action, locator
                )))
            }
            (_, value) => value.unwrap_or(""),
        };

        let element = self.locate_one(browser, locator).await?;
        tracing::debug!(%locator, ?action, "Interacting");

        match self.perform(browser, &element, action, value).await {
            Err(Error::StaleElement(detail)) => {
                // The page re-rendered between lookup and action; look it up again once.
                tracing::debug!(%locator, %detail, "Retrying interaction on stale element");
                let element = self.locate_one(browser, locator).await?;
                self.perform(browser, &element, action, value).await?;
            }
            other => other?,
        }

        Ok(Observation::Ack)
    }

    async fn observe(&self, ctx: &Context, probe: &Probe) -> Result<Observation> {
        let browser = ctx.as_ui()?.browser();
        match probe {
            Probe::Url => Ok(Observation::Page {
                url: browser.current_url().await?,
            }),
            // A stale element is returned as an error: the page is mid re-render,
            // which says nothing about whether the element is there.
            Probe::Element { locator, attribute } => self
                .snapshot(browser, locator, attribute.as_deref())
                .await
                .map(Observation::Elements),
        }
    }
}
