//! Error types for odataql-core.
//!
//! Parse and validation errors only; storage and transaction failures live in
//! the root crate.

use std::time::Duration;

use thiserror::Error;

/// Query language error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Function '{function}' expects {expected} argument(s), got {actual}")]
    InvalidArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Parsing exceeded its deadline of {0:?}")]
    Timeout(Duration),
}

impl QueryError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        QueryError::SyntaxError {
            position,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::ValidationError(message.into())
    }
}

/// Result type for query parsing operations
pub type QueryResult<T> = Result<T, QueryError>;

impl serde::Serialize for QueryError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
