use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use odataql_core::QueryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("Statement deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Shorthand for a metadata or payload validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        DbError::Query(QueryError::validation(message))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DbError::Query(QueryError::Timeout(_)) | DbError::Timeout(_) => {
                StatusCode::REQUEST_TIMEOUT
            }
            DbError::Query(_) | DbError::BadRequest(_) | DbError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            DbError::NotFound(_) => StatusCode::NOT_FOUND,
            DbError::OperationNotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            DbError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StatusCode::CONFLICT
            }
            // Default to 500
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Variant name reported as `type` in error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::Query(QueryError::SyntaxError { .. }) => "SyntaxError",
            DbError::Query(QueryError::InvalidArgumentCount { .. }) => "InvalidArgumentCount",
            DbError::Query(QueryError::UnknownOperator(_)) => "UnknownOperator",
            DbError::Query(QueryError::UnknownFunction(_)) => "UnknownFunction",
            DbError::Query(QueryError::ValidationError(_)) => "ValidationError",
            DbError::Query(QueryError::Timeout(_)) | DbError::Timeout(_) => "Timeout",
            DbError::NotFound(_) => "NotFound",
            DbError::BadRequest(_) => "BadRequest",
            DbError::OperationNotSupported(_) => "OperationNotSupported",
            DbError::TransactionFailure(_) => "TransactionFailure",
            DbError::Cancelled => "Cancelled",
            DbError::Config(_) => "Config",
            DbError::Sqlite(_) => "Sqlite",
            DbError::JsonError(_) => "JsonError",
            DbError::InternalError(_) => "InternalError",
        }
    }

    /// `{error, code, type}` body shared by HTTP and batch responses
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "code": self.status_code().as_u16(),
            "type": self.kind(),
        })
    }
}

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DbError::NotFound("Products(7)".to_string());
        assert_eq!(err.to_string(), "Not found: Products(7)");

        let err = DbError::validation("unknown property 'Colour' on 'Products'");
        assert_eq!(
            err.to_string(),
            "Validation error: unknown property 'Colour' on 'Products'"
        );

        let err = DbError::TransactionFailure("commit failed".to_string());
        assert_eq!(err.to_string(), "Transaction failure: commit failed");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DbError::Query(QueryError::syntax(3, "bad")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DbError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DbError::Timeout(Duration::from_millis(5)).status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            DbError::TransactionFailure("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body() {
        let body = DbError::NotFound("Products(9)".into()).to_body();
        assert_eq!(body["code"], 404);
        assert_eq!(body["type"], "NotFound");
        assert_eq!(body["error"], "Not found: Products(9)");
    }

    #[test]
    fn test_query_errors_convert() {
        fn parse() -> DbResult<()> {
            Err(QueryError::UnknownFunction("frob".into()))?
        }
        let err = parse().unwrap_err();
        assert_eq!(err.kind(), "UnknownFunction");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
