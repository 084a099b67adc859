//! Field equality checks for untyped resources.

use crate::error::CliError;
use serde_json::Value;
use std::str::FromStr;

/// `path=value` check against an object's JSON, e.g. `status.phase=Active`
///
/// Path segments are object keys or array indices. Strings compare as-is,
/// other values by their JSON text (`true`, `3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCheck {
    path: Vec<String>,
    expected: String,
}

impl FromStr for FieldCheck {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, expected) = s.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("field check {s:?} must look like path=value"))
        })?;
        let path: Vec<String> = path.split('.').map(str::to_string).collect();
        if path.iter().any(String::is_empty) {
            return Err(CliError::InvalidArgument(format!(
                "field check {s:?} has an empty path segment"
            )));
        }
        Ok(Self {
            path,
            expected: expected.to_string(),
        })
    }
}

impl FieldCheck {
    /// True if the value at the path equals the expected value
    pub fn matches(&self, object: &Value) -> bool {
        let mut current = object;
        for segment in &self.path {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return false,
            }
        }

        match current {
            Value::String(s) => *s == self.expected,
            Value::Null => false,
            other => other.to_string() == self.expected,
        }
    }
}

/// Predicate that holds when every check matches (always, if there are none)
pub fn all_match(checks: Vec<FieldCheck>) -> impl Fn(&Value) -> bool {
    move |object: &Value| checks.iter().all(|check| check.matches(object))
}
