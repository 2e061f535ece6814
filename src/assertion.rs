//! Assertion engine
//!
//! Evaluation is pure: given an expectation and an observation it produces a
//! verdict with expected/actual detail and never touches the system under
//! test. Waiting for eventually-true state happens before the observation
//! reaches this module.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::observation::{display_value, lookup, FieldValue, Observation};

/// Typed comparison kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    StatusEquals,
    FieldEquals,
    FieldContains,
    FieldPresent,
    CountEquals,
    OrderedEquals,
    NumericRange,
    VisibleEquals,
    TextEquals,
    TextContains,
    UrlMatches,
}

impl AssertionKind {
    /// Kinds that can only be evaluated against an HTTP response
    pub fn needs_response(&self) -> bool {
        matches!(
            self,
            AssertionKind::StatusEquals
                | AssertionKind::FieldEquals
                | AssertionKind::FieldContains
                | AssertionKind::FieldPresent
        )
    }

    /// Kinds that can only be evaluated against a located element
    pub fn needs_element(&self) -> bool {
        matches!(
            self,
            AssertionKind::VisibleEquals | AssertionKind::TextEquals | AssertionKind::TextContains
        )
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Direction of a monotonic sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    /// Whether `a` may precede `b`; ties satisfy both directions
    fn allows(&self, ordering: Ordering) -> bool {
        match self {
            Order::Ascending => ordering != Ordering::Greater,
            Order::Descending => ordering != Ordering::Less,
        }
    }
}

/// String comparator for ordering checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Code point order; upper and lower case are distinct
    #[default]
    Lexicographic,
    /// Lowercased code point order, ties broken by code point order
    CaseInsensitive,
}

impl Comparator {
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Comparator::Lexicographic => a.cmp(b),
            Comparator::CaseInsensitive => a
                .to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b)),
        }
    }

    /// Equality for exact sequences; case is ignored under `CaseInsensitive`
    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        match self {
            Comparator::Lexicographic => a == b,
            Comparator::CaseInsensitive => a.to_lowercase() == b.to_lowercase(),
        }
    }
}

/// Per-expectation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertOptions {
    /// Allowed absolute difference for numeric checks
    #[serde(default)]
    pub tolerance: f64,

    /// Decimal places numbers are compared at
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Required monotonic direction for ordered and numeric checks
    #[serde(default)]
    pub order: Option<Order>,

    #[serde(default)]
    pub comparator: Comparator,

    /// Override of the retry budget for this expectation
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for AssertOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            precision: default_precision(),
            order: None,
            comparator: Comparator::default(),
            timeout_ms: None,
        }
    }
}

fn default_precision() -> u32 {
    2
}

/// A typed expectation ready for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub kind: AssertionKind,
    /// Response field path (dot separated); `None` is the whole body
    pub field: Option<String>,
    pub expected: Value,
    pub options: AssertOptions,
}

impl Expectation {
    pub fn new(kind: AssertionKind, expected: Value) -> Self {
        Self {
            kind,
            field: None,
            expected,
            options: AssertOptions::default(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_options(mut self, options: AssertOptions) -> Self {
        self.options = options;
        self
    }
}

/// Verdict of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub kind: AssertionKind,
    pub passed: bool,
    pub expected: Value,
    pub actual: Value,
    pub message: String,
}

/// Bounds accepted by `numeric_range`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NumericBounds {
    sum: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    first: Option<f64>,
    last: Option<f64>,
}

/// Evaluate an expectation against an observation
pub fn evaluate(expectation: &Expectation, observation: &Observation) -> AssertionResult {
    let kind = expectation.kind;
    let expected = expectation.expected.clone();
    let verdict = match kind {
        AssertionKind::StatusEquals => status_equals(expectation, observation),
        AssertionKind::FieldEquals => field_equals(expectation, observation),
        AssertionKind::FieldContains => field_contains(expectation, observation),
        AssertionKind::FieldPresent => field_present(expectation, observation),
        AssertionKind::CountEquals => count_equals(expectation, observation),
        AssertionKind::OrderedEquals => ordered_equals(expectation, observation),
        AssertionKind::NumericRange => numeric_range(expectation, observation),
        AssertionKind::VisibleEquals => visible_equals(expectation, observation),
        AssertionKind::TextEquals => text_matches(expectation, observation, false),
        AssertionKind::TextContains => text_matches(expectation, observation, true),
        AssertionKind::UrlMatches => url_matches(expectation, observation),
    };

    let (passed, actual, message) = match verdict {
        Ok(v) => v,
        Err((actual, message)) => (false, actual, message),
    };

    AssertionResult {
        kind,
        passed,
        expected,
        actual,
        message,
    }
}

/// `Ok((passed, actual, message))`, or `Err((actual, message))` when the
/// observation cannot answer the question at all
type Verdict = std::result::Result<(bool, Value, String), (Value, String)>;

fn mismatch(kind: AssertionKind, observation: &Observation) -> (Value, String) {
    let what = match observation {
        Observation::Response(_) => "an HTTP response",
        Observation::Elements(_) => "an element snapshot",
        Observation::Page { .. } => "a page URL",
        Observation::Ack => "no observation",
    };
    (Value::Null, format!("{} cannot be evaluated against {}", kind, what))
}

fn field_name(expectation: &Expectation) -> &str {
    expectation.field.as_deref().unwrap_or("")
}

fn field_label(expectation: &Expectation) -> String {
    match expectation.field.as_deref() {
        None | Some("") => "body".to_string(),
        Some(path) => format!("field '{}'", path),
    }
}

/// Resolve the expectation's field in a response observation
fn response_field<'a>(expectation: &Expectation, observation: &'a Observation) -> std::result::Result<FieldValue<'a>, (Value, String)> {
    match observation {
        Observation::Response(response) => response
            .field(field_name(expectation))
            .ok_or_else(|| (Value::Null, format!("{} is missing", field_label(expectation)))),
        other => Err(mismatch(expectation.kind, other)),
    }
}

fn status_equals(expectation: &Expectation, observation: &Observation) -> Verdict {
    let Observation::Response(response) = observation else {
        return Err(mismatch(expectation.kind, observation));
    };
    let expected = expectation
        .expected
        .as_u64()
        .ok_or_else(|| (json!(response.status), format!("expected status must be an integer, got {}", expectation.expected)))?;
    let passed = u64::from(response.status) == expected;
    Ok((
        passed,
        json!(response.status),
        format!("expected status {}, got {}", expected, response.status),
    ))
}

/// Deep equality where numbers compare by value (1 == 1.0)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn field_equals(expectation: &Expectation, observation: &Observation) -> Verdict {
    let field = response_field(expectation, observation)?;
    let label = field_label(expectation);
    let expected = &expectation.expected;
    match &field {
        FieldValue::Single(value) => Ok((
            values_equal(value, expected),
            (*value).clone(),
            format!("expected {} to equal {}, got {}", label, expected, value),
        )),
        FieldValue::Projected(values) => {
            let offender = values.iter().position(|v| !values_equal(v, expected));
            let message = match offender {
                Some(i) => format!(
                    "expected every {} to equal {}, element {} is {}",
                    label, expected, i, values[i]
                ),
                None => format!("every {} equals {}", label, expected),
            };
            Ok((offender.is_none(), field.to_value(), message))
        }
    }
}

/// Substring for strings, membership for arrays, subset for objects
fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, v)| h.get(k).is_some_and(|hv| values_equal(hv, v))),
        (haystack, needle) => values_equal(haystack, needle),
    }
}

fn field_contains(expectation: &Expectation, observation: &Observation) -> Verdict {
    let actual = response_field(expectation, observation)?.to_value();
    let passed = contains(&actual, &expectation.expected);
    Ok((
        passed,
        actual.clone(),
        format!(
            "expected {} to contain {}, got {}",
            field_label(expectation),
            expectation.expected,
            actual
        ),
    ))
}

fn field_present(expectation: &Expectation, observation: &Observation) -> Verdict {
    let Observation::Response(response) = observation else {
        return Err(mismatch(expectation.kind, observation));
    };
    let want_present = expectation.expected.as_bool().unwrap_or(true);
    let found = response.field(field_name(expectation));
    let present = found.is_some();
    let actual = found.map(|f| f.to_value()).unwrap_or(Value::Null);
    let message = if want_present {
        format!("expected {} to be present", field_label(expectation))
    } else {
        format!("expected {} to be absent", field_label(expectation))
    };
    Ok((present == want_present, actual, message))
}

fn count_equals(expectation: &Expectation, observation: &Observation) -> Verdict {
    let count = match observation {
        Observation::Elements(snapshot) => snapshot.count(),
        Observation::Response(_) => match response_field(expectation, observation)? {
            FieldValue::Projected(values) => values.len(),
            FieldValue::Single(Value::Array(items)) => items.len(),
            FieldValue::Single(other) => {
                return Err((other.clone(), format!("{} is not an array", field_label(expectation))))
            }
        },
        other => return Err(mismatch(expectation.kind, other)),
    };
    let expected = expectation
        .expected
        .as_u64()
        .ok_or_else(|| (json!(count), format!("expected count must be an integer, got {}", expectation.expected)))?;
    Ok((
        count as u64 == expected,
        json!(count),
        format!("expected {} matches, got {}", expected, count),
    ))
}

/// Sequence of values an ordering or numeric check runs over
fn sequence(expectation: &Expectation, observation: &Observation) -> std::result::Result<Vec<Value>, (Value, String)> {
    match observation {
        Observation::Elements(snapshot) => Ok(snapshot
            .texts
            .iter()
            .map(|t| Value::String(t.trim().to_string()))
            .collect()),
        Observation::Response(_) => match response_field(expectation, observation)? {
            FieldValue::Projected(values) => Ok(values.into_iter().cloned().collect()),
            FieldValue::Single(Value::Array(items)) => Ok(items.clone()),
            FieldValue::Single(other) => Ok(vec![other.clone()]),
        },
        other => Err(mismatch(expectation.kind, other)),
    }
}

fn ordered_equals(expectation: &Expectation, observation: &Observation) -> Verdict {
    let values = sequence(expectation, observation)?;
    let strings: Vec<String> = values.iter().map(display_value).collect();
    let actual = json!(strings);
    let comparator = expectation.options.comparator;

    let order = match &expectation.expected {
        Value::Array(expected) => {
            let expected: Vec<String> = expected.iter().map(display_value).collect();
            if expected.len() != strings.len() {
                return Ok((
                    false,
                    actual,
                    format!("expected {} items, got {}", expected.len(), strings.len()),
                ));
            }
            let offender = strings
                .iter()
                .zip(&expected)
                .position(|(a, e)| !comparator.equivalent(a, e));
            return Ok(match offender {
                Some(i) => (
                    false,
                    actual,
                    format!("item {}: expected '{}', got '{}'", i, expected[i], strings[i]),
                ),
                None => (true, actual, "sequence matches".to_string()),
            });
        }
        Value::Object(map) => match map.get("sorted") {
            Some(direction) => serde_json::from_value::<Order>(direction.clone()).map_err(|_| {
                (actual.clone(), format!("unknown sort direction {}", direction))
            })?,
            None => return Err((actual, "expected an array or {sorted: ...}".to_string())),
        },
        Value::Null => match expectation.options.order {
            Some(order) => order,
            None => return Err((actual, "no expected sequence or order given".to_string())),
        },
        other => return Err((actual, format!("unsupported expected value {}", other))),
    };

    Ok(match first_out_of_order(&strings, order, |a, b| comparator.compare(a, b)) {
        Some(i) => (
            false,
            actual,
            format!(
                "not {:?}: '{}' precedes '{}' at position {}",
                order,
                strings[i],
                strings[i + 1],
                i
            )
            .to_lowercase(),
        ),
        None => (true, actual, format!("sequence is {:?}", order).to_lowercase()),
    })
}

fn first_out_of_order<T, F>(items: &[T], order: Order, cmp: F) -> Option<usize>
where
    F: Fn(&T, &T) -> Ordering,
{
    items
        .windows(2)
        .position(|pair| !order.allows(cmp(&pair[0], &pair[1])))
}

/// First decimal number in a text, ignoring thousands separators
pub fn extract_number(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let pattern = NUMBER.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));
    let cleaned = text.replace(',', "");
    pattern.find(&cleaned).and_then(|m| m.as_str().parse().ok())
}

/// Scale to an integer count of `10^-precision` units.
/// `None` when the scaled value does not fit in 64 bits.
fn to_fixed(value: f64, precision: u32) -> Option<i128> {
    let exponent = i32::try_from(precision).unwrap_or(i32::MAX);
    let scaled = (value * 10f64.powi(exponent)).round();
    (scaled.is_finite() && scaled.abs() <= i64::MAX as f64).then_some(scaled as i128)
}

fn too_large(actual: &Value, value: f64, precision: u32) -> (Value, String) {
    (
        actual.clone(),
        format!("{} is too large to compare at precision {}", value, precision),
    )
}

fn numeric_range(expectation: &Expectation, observation: &Observation) -> Verdict {
    let values = sequence(expectation, observation)?;
    let mut numbers = Vec::with_capacity(values.len());
    for value in &values {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => extract_number(s),
            _ => None,
        };
        match number {
            Some(n) => numbers.push(n),
            None => return Err((json!(values), format!("value {} is not numeric", value))),
        }
    }
    let actual = json!(numbers);
    if numbers.is_empty() {
        return Ok((false, actual, "no numeric values observed".to_string()));
    }

    let options = &expectation.options;
    let precision = options.precision;
    let tolerance = to_fixed(options.tolerance.abs(), precision)
        .ok_or_else(|| too_large(&actual, options.tolerance, precision))?;
    let fixed = numbers
        .iter()
        .map(|n| to_fixed(*n, precision).ok_or_else(|| too_large(&actual, *n, precision)))
        .collect::<std::result::Result<Vec<i128>, _>>()?;
    // An expected value outside the fixed-point range never matches
    let within = |actual: i128, expected: f64| {
        to_fixed(expected, precision).is_some_and(|expected| (actual - expected).abs() <= tolerance)
    };

    let bounds = match &expectation.expected {
        Value::Null => NumericBounds::default(),
        Value::Number(n) => {
            let target = n.as_f64().unwrap_or_default();
            let offender = fixed.iter().position(|v| !within(*v, target));
            if let Some(i) = offender {
                return Ok((
                    false,
                    actual,
                    format!("value {} differs from {} by more than {}", numbers[i], target, options.tolerance),
                ));
            }
            NumericBounds::default()
        }
        other => serde_json::from_value(other.clone())
            .map_err(|e| (actual.clone(), format!("invalid numeric bounds: {}", e)))?,
    };

    if bounds.sum.is_none()
        && bounds.min.is_none()
        && bounds.max.is_none()
        && bounds.first.is_none()
        && bounds.last.is_none()
        && options.order.is_none()
        && !expectation.expected.is_number()
    {
        return Err((actual, "numeric_range needs bounds, a target or an order".to_string()));
    }

    let mut failures = Vec::new();

    if let Some(order) = options.order {
        if let Some(i) = first_out_of_order(&fixed, order, |a, b| a.cmp(b)) {
            failures.push(format!(
                "not {}: {} then {} at position {}",
                if order == Order::Ascending { "ascending" } else { "descending" },
                numbers[i],
                numbers[i + 1],
                i
            ));
        }
    }
    if let Some(sum) = bounds.sum {
        let total: i128 = fixed.iter().sum();
        if !within(total, sum) {
            failures.push(format!(
                "sum {} differs from {} by more than {}",
                total as f64 / 10f64.powi(precision as i32),
                sum,
                options.tolerance
            ));
        }
    }
    if let Some(min) = bounds.min {
        match to_fixed(min, precision) {
            Some(min_fixed) => {
                if let Some(i) = fixed.iter().position(|v| *v < min_fixed - tolerance) {
                    failures.push(format!("value {} is below minimum {}", numbers[i], min));
                }
            }
            None => failures.push(too_large(&actual, min, precision).1),
        }
    }
    if let Some(max) = bounds.max {
        match to_fixed(max, precision) {
            Some(max_fixed) => {
                if let Some(i) = fixed.iter().position(|v| *v > max_fixed + tolerance) {
                    failures.push(format!("value {} is above maximum {}", numbers[i], max));
                }
            }
            None => failures.push(too_large(&actual, max, precision).1),
        }
    }
    if let Some(first) = bounds.first {
        if !within(fixed[0], first) {
            failures.push(format!("first value {} is not {}", numbers[0], first));
        }
    }
    if let Some(last) = bounds.last {
        let end = fixed.len() - 1;
        if !within(fixed[end], last) {
            failures.push(format!("last value {} is not {}", numbers[end], last));
        }
    }

    Ok(if failures.is_empty() {
        (true, actual, "numeric checks hold".to_string())
    } else {
        (false, actual, failures.join("; "))
    })
}

fn visible_equals(expectation: &Expectation, observation: &Observation) -> Verdict {
    let Observation::Elements(snapshot) = observation else {
        return Err(mismatch(expectation.kind, observation));
    };
    let expected = expectation.expected.as_bool().unwrap_or(true);
    let visible = snapshot.any_visible();
    let message = if expected {
        format!("expected '{}' to be visible", snapshot.locator)
    } else {
        format!("expected '{}' to be hidden or absent", snapshot.locator)
    };
    Ok((visible == expected, json!(visible), message))
}

fn text_matches(expectation: &Expectation, observation: &Observation, substring: bool) -> Verdict {
    let Observation::Elements(snapshot) = observation else {
        return Err(mismatch(expectation.kind, observation));
    };
    let texts: Vec<&str> = snapshot.texts.iter().map(|t| t.trim()).collect();
    let check = |actual: &str, expected: &str| {
        if substring {
            actual.contains(expected)
        } else {
            actual == expected.trim()
        }
    };
    let verb = if substring { "contain" } else { "equal" };

    match &expectation.expected {
        Value::Array(expected) => {
            let expected: Vec<String> = expected.iter().map(display_value).collect();
            let passed = texts.len() == expected.len()
                && texts.iter().zip(&expected).all(|(a, e)| check(a, e));
            Ok((
                passed,
                json!(texts),
                format!("expected texts of '{}' to {} {:?}", snapshot.locator, verb, expected),
            ))
        }
        expected => {
            let expected = display_value(expected);
            match texts.first() {
                None => Ok((
                    false,
                    Value::Null,
                    format!("no element matched '{}'", snapshot.locator),
                )),
                Some(actual) => Ok((
                    check(actual, &expected),
                    json!(actual),
                    format!(
                        "expected text of '{}' to {} '{}', got '{}'",
                        snapshot.locator, verb, expected, actual
                    ),
                )),
            }
        }
    }
}

fn url_matches(expectation: &Expectation, observation: &Observation) -> Verdict {
    let Observation::Page { url } = observation else {
        return Err(mismatch(expectation.kind, observation));
    };
    let pattern = display_value(&expectation.expected);
    let regex = Regex::new(&pattern)
        .map_err(|e| (json!(url), format!("invalid URL pattern '{}': {}", pattern, e)))?;
    Ok((
        regex.is_match(url),
        json!(url),
        format!("expected URL matching '{}', got '{}'", pattern, url),
    ))
}
