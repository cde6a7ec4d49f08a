//! Bound parameter and result cell values.

use base64::Engine;
use odataql_core::{EdmType, LiteralValue};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use serde_json::{Number, Value};

use crate::error::{DbError, DbResult};

/// A value crossing the SQL boundary in either direction
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// JSON value of a result cell, shaped by the declared property type
    pub fn into_json(self, edm_type: Option<EdmType>) -> Value {
        match (self, edm_type) {
            (SqlValue::Null, _) => Value::Null,
            (SqlValue::Integer(i), Some(EdmType::Boolean)) => Value::Bool(i != 0),
            (SqlValue::Integer(i), Some(EdmType::Double | EdmType::Decimal)) => float(i as f64),
            (SqlValue::Integer(i), _) => Value::from(i),
            (SqlValue::Real(f), _) => float(f),
            (SqlValue::Boolean(b), _) => Value::Bool(b),
            (SqlValue::Text(s), Some(EdmType::Boolean)) => Value::Bool(s == "1" || s.eq_ignore_ascii_case("true")),
            (SqlValue::Text(s), _) => Value::String(s),
            (SqlValue::Blob(bytes), _) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
    }

    /// Parameter value for a JSON payload field of the given property type
    pub fn from_json(value: &Value, edm_type: EdmType, property: &str) -> DbResult<Self> {
        let mismatch = || {
            DbError::validation(format!(
                "property '{}' expects {:?}, got {}",
                property, edm_type, value
            ))
        };

        Ok(match (value, edm_type) {
            (Value::Null, _) => SqlValue::Null,
            (Value::Bool(b), EdmType::Boolean) => SqlValue::Boolean(*b),
            (Value::Number(n), EdmType::Int32 | EdmType::Int64) => {
                SqlValue::Integer(n.as_i64().ok_or_else(mismatch)?)
            }
            (Value::Number(n), EdmType::Double | EdmType::Decimal) => {
                SqlValue::Real(n.as_f64().ok_or_else(mismatch)?)
            }
            (Value::String(s), EdmType::Binary) => SqlValue::Blob(
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map_err(|_| mismatch())?,
            ),
            (
                Value::String(s),
                EdmType::String
                | EdmType::DateTime
                | EdmType::Date
                | EdmType::TimeOfDay
                | EdmType::Guid
                | EdmType::Geography,
            ) => SqlValue::Text(s.clone()),
            // Decimal values are often sent as strings to keep precision
            (Value::String(s), EdmType::Decimal) => {
                SqlValue::Real(s.parse().map_err(|_| mismatch())?)
            }
            _ => return Err(mismatch()),
        })
    }

    /// Parameter value for a value read back from a record
    pub fn from_record(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

impl From<LiteralValue> for SqlValue {
    fn from(value: LiteralValue) -> Self {
        match value {
            LiteralValue::Null => SqlValue::Null,
            LiteralValue::Boolean(b) => SqlValue::Boolean(b),
            LiteralValue::Integer(i) => SqlValue::Integer(i),
            LiteralValue::Decimal(d) => SqlValue::Real(d),
            other => other.to_text().map(SqlValue::Text).unwrap_or(SqlValue::Null),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlValue::Boolean(b) => ToSqlOutput::Owned(SqliteValue::Integer(*b as i64)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
        }
    }
}
