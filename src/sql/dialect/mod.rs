//! SQL dialects.
//!
//! A dialect maps operators, functions, identifiers, placeholders and
//! pagination onto backend syntax. Operands arrive as already-rendered SQL
//! fragments; dialects never see literal values, only placeholders.

mod mssql;
mod postgres;
mod sqlite;

pub use mssql::SqlServer;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

use std::fmt;
use std::str::FromStr;

use odataql_core::{BinaryOperator, Function};
use serde::Deserialize;

use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum DialectKind {
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "postgres", alias = "postgresql")]
    Postgres,
    #[serde(rename = "mssql", alias = "sqlserver")]
    SqlServer,
}

impl DialectKind {
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Sqlite => &Sqlite,
            DialectKind::Postgres => &Postgres,
            DialectKind::SqlServer => &SqlServer,
        }
    }
}

impl FromStr for DialectKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DialectKind::Sqlite),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mssql" | "sqlserver" => Ok(DialectKind::SqlServer),
            other => Err(DbError::Config(format!("unknown SQL dialect '{}'", other))),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DialectKind::Sqlite => "sqlite",
            DialectKind::Postgres => "postgres",
            DialectKind::SqlServer => "mssql",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// Backend-specific SQL spelling
pub trait Dialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> DialectKind;

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    fn binary(&self, op: BinaryOperator, left: &str, right: &str) -> String {
        infix(op, left, right)
    }

    fn concat(&self, left: &str, right: &str) -> String {
        format!("CONCAT({}, {})", left, right)
    }

    fn length(&self, arg: &str) -> String {
        format!("LENGTH({})", arg)
    }

    /// `start` is already 1-based
    fn substring(&self, text: &str, start: &str, length: Option<&str>) -> String;

    /// 0-based position of `needle`, -1 when absent
    fn index_of(&self, haystack: &str, needle: &str) -> String;

    fn date_part(&self, part: DatePart, arg: &str) -> String;

    fn current_timestamp(&self) -> &'static str;

    fn floor(&self, arg: &str) -> String {
        format!("FLOOR({})", arg)
    }

    fn ceiling(&self, arg: &str) -> String;

    fn round(&self, arg: &str) -> String {
        format!("ROUND({})", arg)
    }

    /// Case-sensitive match against a bound pattern built by [`Dialect::pattern`]
    fn like(&self, text: &str, pattern: &str) -> String {
        format!("({} LIKE {} ESCAPE '\\')", text, pattern)
    }

    /// Pattern value bound for `contains`, `startswith` or `endswith`
    fn pattern(&self, function: Function, needle: &str) -> String {
        wildcard(function, &escape_like(needle), "%")
    }

    /// Append the pagination clause; `ordered` tells whether ORDER BY is present
    fn paginate(&self, sql: &mut String, skip: Option<u64>, top: Option<u64>, ordered: bool);

    /// Predicate matching one `$search` term or phrase over textual columns
    fn search_term(&self, columns: &[String], param: &str, phrase: bool) -> String;

    /// Parameter value bound for a `$search` term
    fn search_value(&self, term: &str, phrase: bool) -> String;
}

/// `(left op right)` with standard SQL operator symbols
pub(crate) fn infix(op: BinaryOperator, left: &str, right: &str) -> String {
    let symbol = match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::Ne => "<>",
        BinaryOperator::Gt => ">",
        BinaryOperator::Ge => ">=",
        BinaryOperator::Lt => "<",
        BinaryOperator::Le => "<=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Add => "+",
        BinaryOperator::Sub => "-",
        BinaryOperator::Mul => "*",
        BinaryOperator::Div => "/",
        BinaryOperator::Mod => "%",
    };
    format!("({} {} {})", left, symbol, right)
}

/// Wrap an escaped needle with `any` on the open side(s) of `function`
pub(crate) fn wildcard(function: Function, escaped: &str, any: &str) -> String {
    match function {
        Function::StartsWith => format!("{}{}", escaped, any),
        Function::EndsWith => format!("{}{}", any, escaped),
        _ => format!("{}{}{}", any, escaped, any),
    }
}

/// Escape LIKE wildcards with `\` so user text matches literally
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
