//! Locator parsing and resolution
//!
//! A locator is written as a string and parsed into segments:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `[data-test="login-button"]` | attribute selector |
//! | `text=Products` | innermost element whose normalized text equals the value |
//! | `first`, `nth=2` | positional pick from the current matches |
//! | anything else | CSS selector |
//!
//! Segments are chained with ` >> `; each segment is evaluated inside the
//! matches of the previous one, e.g. `.inventory_item >> first >> button`.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::driver::browser::{Browser, By, ElementRef};
use crate::wait::{poll, Attempt, PollPolicy, Polled};

/// Parsed element reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    source: String,
    segments: Vec<Segment>,
}

/// One step of a structural path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Css(String),
    Attribute { name: String, value: String },
    Text(String),
    Nth(usize),
}

impl Segment {
    fn parse(raw: &str) -> std::result::Result<Self, String> {
        if raw == "first" {
            return Ok(Segment::Nth(0));
        }
        if let Some(index) = raw.strip_prefix("nth=") {
            return index
                .trim()
                .parse()
                .map(Segment::Nth)
                .map_err(|_| format!("invalid index '{}'", index));
        }
        if let Some(text) = raw.strip_prefix("text=") {
            let text = unquote(text.trim());
            if text.is_empty() {
                return Err("text selector is empty".to_string());
            }
            return Ok(Segment::Text(text.to_string()));
        }
        if let Some(caps) = attribute_pattern().captures(raw) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");
            return Ok(Segment::Attribute {
                name: caps[1].to_string(),
                value: value.to_string(),
            });
        }
        Ok(Segment::Css(raw.to_string()))
    }

    /// Query strategy for this segment; positional segments have none
    pub fn to_by(&self) -> Option<By> {
        match self {
            Segment::Css(css) => Some(By::Css(css.clone())),
            Segment::Attribute { name, value } => Some(By::Css(format!(
                "[{}=\"{}\"]",
                name,
                value.replace('\\', "\\\\").replace('"', "\\\"")
            ))),
            Segment::Text(text) => Some(By::Text(text.clone())),
            Segment::Nth(_) => None,
        }
    }
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\[([A-Za-z_:][-A-Za-z0-9_:.]*)=(?:"([^"]*)"|'([^']*)'|([^\]"'\s]+))\]$"#)
            .expect("attribute selector pattern is valid")
    })
}

fn unquote(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

impl Locator {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the locator ends by picking one element by position
    pub fn is_positional(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Nth(_)))
    }
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let source = s.trim();
        if source.is_empty() {
            return Err(Error::invalid_locator(s, "locator is empty"));
        }

        let mut segments = Vec::new();
        for raw in source.split(">>").map(str::trim) {
            if raw.is_empty() {
                return Err(Error::invalid_locator(s, "empty segment in path"));
            }
            let segment = Segment::parse(raw).map_err(|reason| Error::invalid_locator(s, &reason))?;
            if segments.is_empty() && matches!(segment, Segment::Nth(_)) {
                return Err(Error::invalid_locator(
                    s,
                    "positional segment needs a preceding selector",
                ));
            }
            segments.push(segment);
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }
}

impl TryFrom<String> for Locator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.source
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Outcome of a bounded resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Vec<ElementRef>),
    NotFound { attempts: u32, waited_ms: u64 },
}

/// Resolve a locator against the current page once, without waiting
pub async fn resolve_now(browser: &dyn Browser, locator: &Locator) -> Result<Vec<ElementRef>> {
    let mut current: Option<Vec<ElementRef>> = None;

    for segment in &locator.segments {
        let next = match (segment, segment.to_by()) {
            (Segment::Nth(index), _) => current
                .take()
                .unwrap_or_default()
                .into_iter()
                .nth(*index)
                .into_iter()
                .collect(),
            (_, Some(by)) => match current.take() {
                None => browser.find_elements(None, &by).await?,
                Some(scopes) => {
                    let mut found: Vec<ElementRef> = Vec::new();
                    for scope in &scopes {
                        for element in browser.find_elements(Some(scope), &by).await? {
                            if !found.contains(&element) {
                                found.push(element);
                            }
                        }
                    }
                    found
                }
            },
            (_, None) => Vec::new(),
        };

        if next.is_empty() {
            return Ok(next);
        }
        current = Some(next);
    }

    Ok(current.unwrap_or_default())
}

/// Resolve a locator, waiting for the page to render it
///
/// Stale references (the page re-rendered between queries) count as "not yet".
pub async fn resolve(
    browser: &dyn Browser,
    locator: &Locator,
    policy: &PollPolicy,
) -> Result<Resolution> {
    let what = format!("element '{}'", locator);
    let outcome = poll(policy, &what, move || async move {
        match resolve_now(browser, locator).await {
            Ok(found) if !found.is_empty() => Ok(Attempt::Ready(found)),
            Ok(_) => Ok(Attempt::Pending(())),
            Err(Error::StaleElement(detail)) => {
                tracing::debug!(locator = %locator, %detail, "Stale element during resolution");
                Ok(Attempt::Pending(()))
            }
            Err(e) => Err(e),
        }
    })
    .await?;

    Ok(match outcome {
        Polled::Ready { value, .. } => Resolution::Found(value),
        Polled::Exhausted {
            attempts, elapsed, ..
        } => Resolution::NotFound {
            attempts,
            waited_ms: elapsed.as_millis() as u64,
        },
    })
}
