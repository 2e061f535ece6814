//! W3C WebDriver wire types
//!
//! Only the subset of the protocol the UI driver needs.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::driver::{By, ElementRef};

/// Key identifying a web element reference in W3C responses
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Key used by pre-W3C (JSON wire protocol) drivers
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// Error payload carried in `value` of a failed response
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// Unwrap a response envelope `{ "value": ... }`
///
/// `success` is the HTTP status class; some drivers report errors with a
/// 200 status, so an `error` member is honoured either way.
pub fn unwrap_value(command: &str, success: bool, envelope: Value) -> Result<Value> {
    let value = match envelope {
        Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
        other => other,
    };

    let has_error = value.get("error").and_then(Value::as_str).is_some();
    if !success || has_error {
        let wire: WireError = serde_json::from_value(value.clone()).unwrap_or(WireError {
            error: "unknown error".to_string(),
            message: value.to_string(),
        });
        if wire.error == "stale element reference" {
            return Err(Error::StaleElement(wire.message));
        }
        return Err(Error::webdriver(command, &wire.error, &wire.message));
    }

    Ok(value)
}

/// Extract element references from a find-elements result
pub fn element_refs(value: &Value) -> Result<Vec<ElementRef>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::Driver(format!("Expected element list, got {}", value)))?;

    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .or_else(|| item.get(LEGACY_ELEMENT_KEY))
                .and_then(Value::as_str)
                .map(|id| ElementRef(id.to_string()))
                .ok_or_else(|| Error::Driver(format!("Malformed element reference: {}", item)))
        })
        .collect()
}

/// Locator strategy body for a find request
pub fn locator_body(by: &By) -> Value {
    match by {
        By::Css(css) => json!({"using": "css selector", "value": css}),
        By::Text(text) => {
            // Match on the element's whole string value so text split across
            // inline children still counts, then keep only the innermost match.
            let literal = xpath_literal(&text.split_whitespace().collect::<Vec<_>>().join(" "));
            json!({
                "using": "xpath",
                "value": format!(
                    ".//*[normalize-space(.)={0} and not(./*[normalize-space(.)={0}])]",
                    literal
                ),
            })
        }
    }
}

/// Quote a string as an XPath literal
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Session id from a new-session response value
pub fn session_id(value: &Value) -> Option<String> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Capabilities for an isolated session
pub fn capabilities(browser: &str, headless: bool, args: &[String]) -> Value {
    let mut args: Vec<String> = args.to_vec();
    match browser {
        "firefox" => {
            if headless {
                args.push("-headless".to_string());
            }
            json!({"browserName": "firefox", "moz:firefoxOptions": {"args": args}})
        }
        "chrome" | "chromium" => {
            if headless {
                args.push("--headless=new".to_string());
            }
            json!({"browserName": "chrome", "goog:chromeOptions": {"args": args}})
        }
        other => json!({"browserName": other}),
    }
}
