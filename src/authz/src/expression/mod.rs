//! Required-permission expression templates
//!
//! An expression is literal text with `${path}` placeholders. Paths are
//! dot-separated identifiers resolved against the four roots of an
//! [`EvalContext`]: `metadata`, `request`, `user` and `rule`.
//!
//! Expressions are parsed and validated once, when the rule mapping is
//! loaded, and rendered per call.

pub mod context;
pub mod error;
pub mod template;

pub use context::{join_metadata, EvalContext};
pub use error::{ExpressionError, Result};
pub use template::{is_valid_expression, placeholder_keys, render, Expression, Path};
