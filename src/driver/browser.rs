//! Browser backend seam for the UI driver
//!
//! The UI driver only talks to a page through [`Browser`]. The shipped
//! backend is the WebDriver client in [`crate::webdriver`]; tests plug in
//! scripted pages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::Result;

/// Opaque handle to a live element in the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Element query strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum By {
    /// CSS selector
    Css(String),
    /// Element whose own, whitespace-normalized text equals the value
    Text(String),
}

/// One isolated browser session (own cookies and storage)
///
/// All calls take `&self` so waits can re-query while the session is
/// borrowed elsewhere; implementations synchronize internally.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn refresh(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Find elements in the document (`scope = None`) or below an element
    async fn find_elements(&self, scope: Option<&ElementRef>, by: &By) -> Result<Vec<ElementRef>>;

    async fn click(&self, element: &ElementRef) -> Result<()>;

    async fn clear(&self, element: &ElementRef) -> Result<()>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()>;

    async fn text(&self, element: &ElementRef) -> Result<String>;

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool>;

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    /// Drop cookies, local storage and session storage
    async fn reset_storage(&self) -> Result<()>;

    /// End the session; must tolerate being called on a closed session
    async fn close(&self) -> Result<()>;
}

/// Creates fresh isolated browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Browser>>;
}
