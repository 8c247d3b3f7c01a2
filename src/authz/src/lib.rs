//! # RPC Method Authorizer
//!
//! Request-time, permission-matching authorization for RPC method calls.
//!
//! ## Features
//!
//! - **Per-method rule sets** loaded once and shared read-only across threads
//! - **Expression templates** such as `app:${request.Namespace}/${user.Name}:get`,
//!   validated when the mapping is loaded
//! - **Wildcard grants**: a held permission like `app:dev/*:get` matches any
//!   rendered requirement it covers
//! - **Explicit failures**: broken principals or rules are errors, never a
//!   silent deny
//!
//! ## Example
//!
//! ```rust
//! use rpc_authz::{CallParams, MatchAuthorizer, RuleMap, RuleSet};
//! use serde_json::json;
//!
//! fn main() -> Result<(), rpc_authz::AuthzError> {
//!     let mut rules = RuleMap::new();
//!     rules.insert(
//!         "/app.v1.AppService/GetApp".to_string(),
//!         RuleSet::new().with_rule("app:${user.Namespace}/${request.Name}:get"),
//!     );
//!     let authorizer = MatchAuthorizer::new(rules)?;
//!
//!     let user = json!({ "Namespace": "dev", "Permissions": ["app:dev/*:get"] });
//!     let params = CallParams::new(&user).with_request(json!({ "Name": "shop" }));
//!
//!     if authorizer.authorize_method("/app.v1.AppService/GetApp", &params)? {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod expression;
pub mod matcher;
pub mod principal;
pub mod types;

// Re-export commonly used types
pub use engine::{
    AuthorizerConfig, Decision, DecisionReason, MatchAuthorizer, MethodAuthorizer,
    UnconfiguredPolicy,
};
pub use error::{AuthzError, Result};
pub use expression::{is_valid_expression, EvalContext, Expression, ExpressionError};
pub use matcher::{permission_match, permissions_match, MatchError, WildcardMatcher};
pub use principal::{extract_permissions, PermissionError, Principal, Record};
pub use types::{full_method_name, service_name, CallParams, MethodName, Rule, RuleMap, RuleSet};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
