//! Authorization decision types

use serde::{Deserialize, Serialize};

/// Outcome of authorizing one method call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the call is allowed
    pub allowed: bool,

    /// Why the call was allowed or denied
    pub reason: DecisionReason,
}

impl Decision {
    /// Create an allow decision
    pub fn allow(reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    /// Create a deny decision
    pub fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Reason for an authorization decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DecisionReason {
    /// A held permission matched a required permission
    PermissionMatched { required: String, held: String },

    /// No held permission matched any required permission
    NoMatchingPermission { required: Vec<String> },

    /// Method is unconfigured but its service has configured methods
    ServiceFallback { service: String },

    /// Method is unconfigured and its service is unknown
    UnknownService { service: String },

    /// Method is unconfigured; the fixed unconfigured-method policy applied
    UnconfiguredMethod,
}
