//! Evaluation context for expression rendering

use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write;

use super::template::Path;

static NULL: Value = Value::Null;

/// Root names available to placeholders
pub const METADATA_ROOT: &str = "metadata";
pub const REQUEST_ROOT: &str = "request";
pub const USER_ROOT: &str = "user";
pub const RULE_ROOT: &str = "rule";

/// Per-call values that placeholders resolve against
///
/// Built fresh for every authorization decision and dropped with it.
#[derive(Debug, Clone)]
pub struct EvalContext<'a> {
    /// Call metadata, repeated values already joined with `,`
    pub metadata: HashMap<String, String>,

    /// Request payload
    pub request: &'a Value,

    /// Structural view of the principal
    pub user: Cow<'a, Value>,

    /// Serialized view of the active rule set
    pub rule: &'a Value,
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        Self {
            metadata: HashMap::new(),
            request: &NULL,
            user: Cow::Borrowed(&NULL),
            rule: &NULL,
        }
    }
}

impl<'a> EvalContext<'a> {
    /// Create an empty evaluation context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with call metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Create context with the request payload
    pub fn with_request(mut self, request: &'a Value) -> Self {
        self.request = request;
        self
    }

    /// Create context with the principal view
    pub fn with_user(mut self, user: Cow<'a, Value>) -> Self {
        self.user = user;
        self
    }

    /// Create context with the rule set view
    pub fn with_rule(mut self, rule: &'a Value) -> Self {
        self.rule = rule;
        self
    }

    /// Append the value at `path` to `out`
    ///
    /// Missing fields and unknown roots write nothing.
    pub(crate) fn write_path(&self, path: &Path, out: &mut String) {
        let Some((root, keys)) = path.keys().split_first() else {
            return;
        };

        match root.as_str() {
            METADATA_ROOT => match keys {
                [] => write_metadata(&self.metadata, out),
                [key] => {
                    if let Some(value) = self.metadata.get(key) {
                        out.push_str(value);
                    }
                }
                _ => {}
            },
            REQUEST_ROOT => write_value(walk(self.request, keys), out),
            USER_ROOT => write_value(walk(&self.user, keys), out),
            RULE_ROOT => write_value(walk(self.rule, keys), out),
            _ => {}
        }
    }
}

/// Join repeated metadata values with `,`
pub fn join_metadata(metadata: &HashMap<String, Vec<String>>) -> HashMap<String, String> {
    metadata
        .iter()
        .map(|(key, values)| (key.clone(), values.join(",")))
        .collect()
}

fn walk<'v>(root: &'v Value, keys: &[String]) -> Option<&'v Value> {
    keys.iter().try_fold(root, |current, key| match current {
        Value::Object(fields) => fields.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn write_value(value: Option<&Value>, out: &mut String) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => out.push_str(s),
        Some(other) => {
            let _ = write!(out, "{}", other);
        }
    }
}

fn write_metadata(metadata: &HashMap<String, String>, out: &mut String) {
    let mut entries: Vec<_> = metadata.iter().collect();
    entries.sort_by_key(|(k, _)| *k);
    let object: serde_json::Map<String, Value> = entries
        .into_iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let _ = write!(out, "{}", Value::Object(object));
}
