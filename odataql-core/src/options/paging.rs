//! `$skip`, `$top` and `$count`.

use crate::config::ParserConfig;
use crate::error::{QueryError, QueryResult};

fn parse_non_negative(option: &str, value: &str) -> QueryResult<u64> {
    let trimmed = value.trim();
    let parsed: i64 = trimmed.parse().map_err(|_| {
        QueryError::syntax(0, format!("{} must be an integer, got '{}'", option, trimmed))
    })?;
    if parsed < 0 {
        return Err(QueryError::validation(format!(
            "{} must be non-negative, got {}",
            option, parsed
        )));
    }
    Ok(parsed as u64)
}

pub fn parse_skip(value: &str) -> QueryResult<u64> {
    parse_non_negative("$skip", value)
}

/// `$top` bounded by the configured ceiling
pub fn parse_top(value: &str, config: &ParserConfig) -> QueryResult<u64> {
    let top = parse_non_negative("$top", value)?;
    if top > config.max_top {
        return Err(QueryError::validation(format!(
            "$top must not exceed {}, got {}",
            config.max_top, top
        )));
    }
    Ok(top)
}

pub fn parse_count(value: &str) -> QueryResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(QueryError::syntax(
            0,
            format!("$count must be true or false, got '{}'", other),
        )),
    }
}
