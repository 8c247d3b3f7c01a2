//! Error types for the method authorizer

use thiserror::Error;

use crate::expression::ExpressionError;
use crate::matcher::MatchError;
use crate::principal::PermissionError;

/// Authorization errors
///
/// A denied call is not an error: these variants describe calls that could
/// not be evaluated at all and should be reported as a server fault.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A rule expression failed validation while the mapping was loaded
    #[error("invalid expression `{expression}` for method {method}: {source}")]
    Configuration {
        method: String,
        expression: String,
        #[source]
        source: ExpressionError,
    },

    /// The rule mapping could not be deserialized
    #[error("invalid rule mapping: {0}")]
    InvalidMapping(#[from] serde_json::Error),

    /// The principal's permissions could not be read
    #[error("failed to get permissions: {0}")]
    PermissionExtractionFailed(#[from] PermissionError),

    /// The principal holds no permissions at all
    #[error("principal does not have any permissions")]
    NoPermissions,

    /// A held permission could not be turned into a pattern
    #[error(transparent)]
    Match(#[from] MatchError),
}

impl AuthzError {
    /// Whether the error stems from a broken rule mapping rather than the call
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::InvalidMapping(_))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
