//! Core authorization types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::principal::Principal;

/// Fully qualified method identifier (e.g., "/shop.v1.ShopService/AddItem")
pub type MethodName = String;

/// Method identifier to rule set mapping, as emitted by the code generator
pub type RuleMap = HashMap<MethodName, RuleSet>;

/// A single required-permission expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Permission template (e.g., "app:${request.Namespace}/${request.Name}:get")
    pub expression: String,
}

impl Rule {
    /// Create a new rule
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

/// Ordered rules attached to one method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rules, evaluated in order
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule
    pub fn with_rule(mut self, expression: impl Into<String>) -> Self {
        self.rules.push(Rule::new(expression));
        self
    }

    /// Rule expressions in evaluation order
    pub fn expressions(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.expression.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for RuleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().map(Rule::new).collect(),
        }
    }
}

/// Build a method identifier from its service and method names
pub fn full_method_name(service: &str, method: &str) -> MethodName {
    format!("/{}/{}", service, method)
}

/// Leading path segment of a method identifier
///
/// `/shop.v1.ShopService/AddItem` yields `shop.v1.ShopService`. Identifiers
/// without a separator are returned whole.
pub fn service_name(method: &str) -> &str {
    let trimmed = method.strip_prefix('/').unwrap_or(method);
    match trimmed.split_once('/') {
        Some((service, _)) => service,
        None => trimmed,
    }
}

/// Per-call inputs to the authorizer
pub struct CallParams<'a> {
    /// Incoming call metadata; repeated values are joined with `,` before use
    pub metadata: HashMap<String, Vec<String>>,

    /// Request payload
    pub request: Value,

    /// Authenticated principal
    pub user: &'a dyn Principal,
}

impl<'a> CallParams<'a> {
    /// Create call parameters for a principal with an empty request
    pub fn new(user: &'a dyn Principal) -> Self {
        Self {
            metadata: HashMap::new(),
            request: Value::Null,
            user,
        }
    }

    /// Set the request payload
    pub fn with_request(mut self, request: Value) -> Self {
        self.request = request;
        self
    }

    /// Add a metadata entry
    pub fn with_metadata<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }
}
