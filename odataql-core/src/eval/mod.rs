//! In-memory expression evaluation over JSON records.
//!
//! Used to re-apply nested `$filter`s to related rows and to compute nested
//! `$compute` columns. Null handling follows OData: `eq`/`ne` treat null as
//! a value, ordering comparisons against null are false, and functions or
//! arithmetic over null yield null.

mod value;

pub use value::{format_datetime, parse_datetime, LiteralValue};

use std::cmp::Ordering;

use chrono::{Datelike, Timelike, Utc};
use serde_json::{Map, Number, Value};

use crate::ast::{BinaryOperator, ComputeItem, Expression, Function, UnaryOperator};
use crate::error::{QueryError, QueryResult};

pub type Record = Map<String, Value>;

/// Evaluates expressions against one record at a time
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator<'a> {
    compute: &'a [ComputeItem],
}

impl<'a> Evaluator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `$compute` aliases that are not materialised in the record
    pub fn with_compute(compute: &'a [ComputeItem]) -> Self {
        Self { compute }
    }

    /// Filter semantics: only a boolean `true` keeps the record
    pub fn matches(&self, expr: &Expression, record: &Record) -> QueryResult<bool> {
        Ok(self.evaluate(expr, record)? == Value::Bool(true))
    }

    pub fn evaluate(&self, expr: &Expression, record: &Record) -> QueryResult<Value> {
        match expr {
            Expression::Literal(literal) => Ok(literal.value()?.to_json()),
            Expression::Property(path) => Ok(self.lookup(path.first(), record)?),
            Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand,
            } => Ok(match self.evaluate(operand, record)? {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::Null,
            }),
            Expression::BinaryOp { left, op, right } => {
                let l = self.evaluate(left, record)?;
                // short-circuit, null counts as false
                match op {
                    BinaryOperator::And if l != Value::Bool(true) => return Ok(Value::Bool(false)),
                    BinaryOperator::Or if l == Value::Bool(true) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let r = self.evaluate(right, record)?;
                binary(*op, l, r)
            }
            Expression::FunctionCall { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg, record))
                    .collect::<QueryResult<Vec<_>>>()?;
                call(*function, &values)
            }
        }
    }

    fn lookup(&self, name: &str, record: &Record) -> QueryResult<Value> {
        if let Some(value) = record.get(name) {
            return Ok(value.clone());
        }
        if let Some((_, value)) = record.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            return Ok(value.clone());
        }
        match self
            .compute
            .iter()
            .find(|c| c.alias.eq_ignore_ascii_case(name))
        {
            Some(item) => Evaluator::new().evaluate(&item.expression, record),
            None => Ok(Value::Null),
        }
    }
}

/// Append `$compute` columns to a record
pub fn apply_compute(compute: &[ComputeItem], record: &mut Record) -> QueryResult<()> {
    let evaluator = Evaluator::new();
    for item in compute {
        let value = evaluator.evaluate(&item.expression, record)?;
        record.insert(item.alias.clone(), value);
    }
    Ok(())
}

fn binary(op: BinaryOperator, l: Value, r: Value) -> QueryResult<Value> {
    use BinaryOperator::*;

    Ok(match op {
        And => Value::Bool(l == Value::Bool(true) && r == Value::Bool(true)),
        Or => Value::Bool(l == Value::Bool(true) || r == Value::Bool(true)),
        Eq => Value::Bool(equals(&l, &r)),
        Ne => Value::Bool(!equals(&l, &r)),
        Gt | Ge | Lt | Le => match compare(&l, &r) {
            Some(ordering) => Value::Bool(match op {
                Gt => ordering == Ordering::Greater,
                Ge => ordering != Ordering::Less,
                Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }),
            None => Value::Bool(false),
        },
        Add | Sub | Mul | Div | Mod => arithmetic(op, &l, &r),
    })
}

fn equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => compare(l, r) == Some(Ordering::Equal),
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => {
            match (parse_datetime_strict(a), parse_datetime_strict(b)) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => Some(a.cmp(b)),
            }
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        // SQLite hands booleans back as integers
        (Value::Bool(a), Value::Number(n)) => n.as_i64().map(|n| (*a as i64).cmp(&n)),
        (Value::Number(n), Value::Bool(b)) => n.as_i64().map(|n| n.cmp(&(*b as i64))),
        _ => None,
    }
}

/// Only strings that look like dates are compared chronologically
fn parse_datetime_strict(text: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let bytes = text.as_bytes();
    if bytes.len() >= 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        parse_datetime(text)
    } else {
        None
    }
}

fn arithmetic(op: BinaryOperator, l: &Value, r: &Value) -> Value {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Value::Null;
    };
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOperator::Add => a.checked_add(b),
            BinaryOperator::Sub => a.checked_sub(b),
            BinaryOperator::Mul => a.checked_mul(b),
            BinaryOperator::Div => a.checked_div(b),
            _ => a.checked_rem(b),
        };
        return result.map(Value::from).unwrap_or(Value::Null);
    }
    let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
        return Value::Null;
    };
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => a / b,
        _ => a % b,
    };
    float(result)
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn call(function: Function, args: &[Value]) -> QueryResult<Value> {
    function.check_arity(args.len())?;
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    let text = |i: usize| -> QueryResult<String> {
        match &args[i] {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(QueryError::validation(format!(
                "{}() expects a string argument, got {}",
                function.name(),
                other
            ))),
        }
    };
    let integer = |i: usize| -> QueryResult<i64> {
        args[i].as_i64().ok_or_else(|| {
            QueryError::validation(format!(
                "{}() expects an integer argument, got {}",
                function.name(),
                args[i]
            ))
        })
    };
    let number = |i: usize| -> QueryResult<f64> {
        args[i].as_f64().ok_or_else(|| {
            QueryError::validation(format!(
                "{}() expects a numeric argument, got {}",
                function.name(),
                args[i]
            ))
        })
    };

    Ok(match function {
        Function::Contains => Value::Bool(text(0)?.contains(&text(1)?)),
        Function::StartsWith => Value::Bool(text(0)?.starts_with(&text(1)?)),
        Function::EndsWith => Value::Bool(text(0)?.ends_with(&text(1)?)),
        Function::Length => Value::from(text(0)?.chars().count() as i64),
        Function::ToLower => Value::String(text(0)?.to_lowercase()),
        Function::ToUpper => Value::String(text(0)?.to_uppercase()),
        Function::Trim => Value::String(text(0)?.trim().to_string()),
        Function::Concat => Value::String(text(0)? + &text(1)?),
        Function::IndexOf => {
            let haystack = text(0)?;
            let needle = text(1)?;
            let index = haystack
                .find(&needle)
                .map(|byte| haystack[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Value::from(index)
        }
        Function::Substring => {
            let s = text(0)?;
            let start = integer(1)?.max(0) as usize;
            let chars = s.chars().skip(start);
            let out: String = if args.len() == 3 {
                chars.take(integer(2)?.max(0) as usize).collect()
            } else {
                chars.collect()
            };
            Value::String(out)
        }
        Function::Year
        | Function::Month
        | Function::Day
        | Function::Hour
        | Function::Minute
        | Function::Second => {
            let raw = text(0)?;
            let Some(dt) = parse_datetime(&raw) else {
                return Err(QueryError::validation(format!(
                    "{}() expects a date or datetime, got '{}'",
                    function.name(),
                    raw
                )));
            };
            let part = match function {
                Function::Year => dt.year() as i64,
                Function::Month => dt.month() as i64,
                Function::Day => dt.day() as i64,
                Function::Hour => dt.hour() as i64,
                Function::Minute => dt.minute() as i64,
                _ => dt.second() as i64,
            };
            Value::from(part)
        }
        Function::Round => float(number(0)?.round()),
        Function::Floor => float(number(0)?.floor()),
        Function::Ceiling => float(number(0)?.ceil()),
        Function::Now => Value::String(format_datetime(&Utc::now().fixed_offset())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::parse_compute;
    use crate::config::ParserConfig;
    use crate::parser::parse_filter;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn eval(filter: &str, value: Value) -> bool {
        let expr = parse_filter(filter).unwrap();
        Evaluator::new().matches(&expr, &record(value)).unwrap()
    }

    #[test]
    fn test_comparisons() {
        let row = json!({"Name": "Widget", "Price": 9.5, "Quantity": 3});
        assert!(eval("Price gt 5", row.clone()));
        assert!(eval("Quantity eq 3 and Name eq 'Widget'", row.clone()));
        assert!(!eval("Quantity ge 4 or Name ne 'Widget'", row.clone()));
        assert!(eval("Price lt 10.0", row));
    }

    #[test]
    fn test_null_semantics() {
        let row = json!({"Name": null, "Price": 1});
        assert!(eval("Name eq null", row.clone()));
        assert!(!eval("Name ne null", row.clone()));
        assert!(!eval("Name gt 'a'", row.clone()));
        assert!(!eval("contains(Name,'a')", row.clone()));
        assert!(!eval("not contains(Name,'a')", row.clone()));
        assert!(eval("Name ne 'a'", row));
    }

    #[test]
    fn test_string_functions() {
        let row = json!({"Name": "  Gadget ", "Sku": "AB-1"});
        assert!(eval("trim(Name) eq 'Gadget'", row.clone()));
        assert!(eval("tolower(Sku) eq 'ab-1' and toupper(Sku) eq 'AB-1'", row.clone()));
        assert!(eval("length(Sku) eq 4", row.clone()));
        assert!(eval("indexof(Sku,'-') eq 2", row.clone()));
        assert!(eval("substring(Sku,1) eq 'B-1' and substring(Sku,0,2) eq 'AB'", row.clone()));
        assert!(eval("concat(Sku,'x') eq 'AB-1x'", row.clone()));
        assert!(eval("startswith(Sku,'AB') and endswith(Sku,'-1')", row));
    }

    #[test]
    fn test_arithmetic() {
        let row = json!({"Price": 10, "Rate": 0.5});
        assert!(eval("Price add 2 mul 3 eq 16", row.clone()));
        assert!(eval("Price div 3 eq 3 and Price mod 3 eq 1", row.clone()));
        assert!(eval("Price mul Rate eq 5", row.clone()));
        assert!(eval("round(Rate add 0.1) eq 1 and floor(Rate) eq 0 and ceiling(Rate) eq 1", row));
    }

    #[test]
    fn test_datetime_functions() {
        let row = json!({"CreatedAt": "2024-03-01T10:20:30Z"});
        assert!(eval("year(CreatedAt) eq 2024 and month(CreatedAt) eq 3 and day(CreatedAt) eq 1", row.clone()));
        assert!(eval("hour(CreatedAt) eq 10 and minute(CreatedAt) eq 20 and second(CreatedAt) eq 30", row.clone()));
        assert!(eval("CreatedAt gt 2024-01-01T00:00:00Z", row.clone()));
        assert!(eval("CreatedAt lt now()", row));
    }

    #[test]
    fn test_compute_aliases() {
        let compute = parse_compute("Price mul 2 as Doubled", &ParserConfig::default(), None).unwrap();
        let row = record(json!({"Price": 4}));
        let expr = parse_filter("Doubled eq 8").unwrap();
        assert!(Evaluator::with_compute(&compute).matches(&expr, &row).unwrap());

        let mut row = row;
        apply_compute(&compute, &mut row).unwrap();
        assert_eq!(row.get("Doubled"), Some(&json!(8)));
    }

    #[test]
    fn test_sqlite_booleans() {
        assert!(eval("Active eq true", json!({"Active": 1})));
        assert!(!eval("Active eq true", json!({"Active": 0})));
    }
}
