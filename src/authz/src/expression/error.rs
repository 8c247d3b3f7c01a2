//! Error types for expression parsing and rendering

use thiserror::Error;

/// Expression errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("unclosed placeholder at byte {position}")]
    Syntax { position: usize },

    #[error("invalid placeholder path `{path}`")]
    InvalidPath { path: String },

    #[error("placeholder path `{path}` is not allowed")]
    ForbiddenPath { path: String },
}

/// Result type for expression operations
pub type Result<T> = std::result::Result<T, ExpressionError>;
