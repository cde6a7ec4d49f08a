//! Typed literal values.
//!
//! The parser keeps literals as raw text; coercion happens here, when a
//! compiler or the in-memory evaluator needs the value.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::ast::{Literal, LiteralKind};
use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Guid(Uuid),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    TimeOfDay(NaiveTime),
    /// Well-known text, e.g. `POINT(-122.1 47.6)`
    Geography(String),
}

impl LiteralValue {
    /// Canonical text for values stored as text columns
    pub fn to_text(&self) -> Option<String> {
        match self {
            LiteralValue::Null => None,
            LiteralValue::Boolean(b) => Some(b.to_string()),
            LiteralValue::Integer(i) => Some(i.to_string()),
            LiteralValue::Decimal(d) => Some(d.to_string()),
            LiteralValue::String(s) | LiteralValue::Geography(s) => Some(s.clone()),
            LiteralValue::Guid(g) => Some(g.hyphenated().to_string()),
            LiteralValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            LiteralValue::DateTime(dt) => Some(format_datetime(dt)),
            LiteralValue::TimeOfDay(t) => Some(t.format("%H:%M:%S%.f").to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            LiteralValue::Null => Value::Null,
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Integer(i) => Value::from(*i),
            LiteralValue::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            other => other.to_text().map(Value::String).unwrap_or(Value::Null),
        }
    }
}

/// RFC 3339 with a `Z` suffix for UTC
pub fn format_datetime(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a stored or literal datetime; offset-less values are taken as UTC
pub fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

impl Literal {
    /// Coerce the raw text into a typed value
    pub fn value(&self) -> QueryResult<LiteralValue> {
        let raw = self.raw.as_str();
        let invalid = || QueryError::validation(format!("invalid {:?} literal {}", self.kind, raw));

        Ok(match self.kind {
            LiteralKind::Null => LiteralValue::Null,
            LiteralKind::Boolean => LiteralValue::Boolean(raw.eq_ignore_ascii_case("true")),
            LiteralKind::Integer => LiteralValue::Integer(raw.parse().map_err(|_| invalid())?),
            LiteralKind::Decimal => LiteralValue::Decimal(raw.parse().map_err(|_| invalid())?),
            LiteralKind::String => LiteralValue::String(unquote(raw).ok_or_else(invalid)?),
            LiteralKind::Guid => LiteralValue::Guid(Uuid::parse_str(raw).map_err(|_| invalid())?),
            LiteralKind::Date => LiteralValue::Date(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?,
            ),
            LiteralKind::DateTime => LiteralValue::DateTime(parse_datetime(raw).ok_or_else(invalid)?),
            LiteralKind::TimeOfDay => LiteralValue::TimeOfDay(
                NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
                    .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                    .map_err(|_| invalid())?,
            ),
            LiteralKind::Geography => {
                let start = raw.find('\'').ok_or_else(invalid)?;
                let wkt = unquote(&raw[start..]).ok_or_else(invalid)?;
                if !wkt.to_ascii_uppercase().starts_with("POINT(") || !wkt.ends_with(')') {
                    return Err(invalid());
                }
                LiteralValue::Geography(wkt)
            }
        })
    }
}

/// `'O''Neil'` -> `O'Neil`
fn unquote(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}
