//! Run-scoped variables and `${name}` interpolation

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::common::{Error, Result};
use crate::observation::display_value;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid")
    })
}

/// Values visible to the steps of one run
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    /// Fresh variables for a run: `run_id` and `timestamp`
    pub fn for_run() -> Self {
        let mut vars = Self::default();
        let run_id: u64 = rand::thread_rng().gen_range(100_000_000..1_000_000_000);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        vars.set("run_id", Value::from(run_id));
        vars.set("timestamp", Value::from(timestamp));
        vars
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Substitute every `${name}` in a string
    pub fn interpolate(&self, text: &str) -> Result<String> {
        let mut missing = None;
        let replaced = pattern().replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match self.values.get(name) {
                Some(value) => display_value(value),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(Error::UnknownVariable(name)),
            None => Ok(replaced.into_owned()),
        }
    }

    /// Substitute inside a JSON value
    ///
    /// A string that is exactly one `${name}` becomes the variable's JSON
    /// value, so numeric ids stay numbers.
    pub fn interpolate_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => {
                if let Some(caps) = pattern().captures(s) {
                    if caps.get(0).map(|m| m.as_str().len()) == Some(s.len()) {
                        let name = &caps[1];
                        return self
                            .values
                            .get(name)
                            .cloned()
                            .ok_or_else(|| Error::UnknownVariable(name.to_string()));
                    }
                }
                self.interpolate(s).map(Value::String)
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.interpolate_value(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(self.interpolate(key)?, self.interpolate_value(item)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    pub fn interpolate_map(&self, map: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.interpolate(v)?)))
            .collect()
    }
}
