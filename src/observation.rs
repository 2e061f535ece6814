//! Values captured by executing a step

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a step observed of the system under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    /// An HTTP response
    Response(ResponseSnapshot),
    /// The elements a locator matched at one instant
    Elements(ElementSnapshot),
    /// The page itself
    Page { url: String },
    /// The step completed without producing a value
    Ack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON body, or a string when the body is not JSON, or null when empty
    pub body: Value,
}

impl ResponseSnapshot {
    /// Look up a field path in the body
    pub fn field(&self, path: &str) -> Option<FieldValue<'_>> {
        lookup(&self.body, path)
    }
}

/// Per-element facts, index-aligned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub locator: String,
    pub texts: Vec<String>,
    pub visible: Vec<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Option<String>>,
}

impl ElementSnapshot {
    /// Snapshot of a locator that matched nothing
    pub fn empty(locator: &str) -> Self {
        Self {
            locator: locator.to_string(),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.texts.len()
    }

    pub fn any_visible(&self) -> bool {
        self.visible.iter().any(|v| *v)
    }
}

/// Result of a field lookup
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    /// Plain path
    Single(&'a Value),
    /// Path with a `*` segment: one value per array element
    Projected(Vec<&'a Value>),
}

impl<'a> FieldValue<'a> {
    /// The value as a JSON value (projections become arrays)
    pub fn to_value(&self) -> Value {
        match self {
            FieldValue::Single(v) => (*v).clone(),
            FieldValue::Projected(values) => {
                Value::Array(values.iter().map(|v| (*v).clone()).collect())
            }
        }
    }
}

/// Resolve a dot separated field path
///
/// Numeric segments index arrays, `*` projects every element of an array,
/// and an empty path is the whole value. Returns `None` when any segment is
/// missing.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<FieldValue<'a>> {
    let path = path.trim();
    if path.is_empty() {
        return Some(FieldValue::Single(root));
    }

    let mut current: Vec<&'a Value> = vec![root];
    let mut projected = false;

    for segment in path.split('.') {
        let mut next = Vec::with_capacity(current.len());
        for value in current {
            if segment == "*" {
                next.extend(value.as_array()?.iter());
            } else if let Some(array) = value.as_array() {
                let index: usize = segment.parse().ok()?;
                next.push(array.get(index)?);
            } else {
                next.push(value.as_object()?.get(segment)?);
            }
        }
        if segment == "*" {
            projected = true;
        }
        current = next;
    }

    if projected {
        Some(FieldValue::Projected(current))
    } else {
        current.pop().map(FieldValue::Single)
    }
}

/// Render a JSON value the way it reads in a message
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
