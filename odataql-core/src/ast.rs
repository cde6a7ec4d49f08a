//! AST for filter, orderby and compute expressions, plus the parsed shape of
//! every query option.

use std::fmt;

use crate::error::{QueryError, QueryResult};

/// Expression tree produced by the expression parser
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Property(PropertyPath),
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    FunctionCall {
        function: Function,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn property(name: impl Into<String>) -> Self {
        Expression::Property(PropertyPath::single(name))
    }

    /// Visit every property reference in the tree, left to right
    pub fn for_each_property<'a>(&'a self, f: &mut impl FnMut(&'a PropertyPath)) {
        match self {
            Expression::Literal(_) => {}
            Expression::Property(path) => f(path),
            Expression::BinaryOp { left, right, .. } => {
                left.for_each_property(f);
                right.for_each_property(f);
            }
            Expression::UnaryOp { operand, .. } => operand.for_each_property(f),
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.for_each_property(f);
                }
            }
        }
    }
}

/// Canonical, fully parenthesized OData text; parsing it yields the same tree.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => write!(f, "{}", lit.raw),
            Expression::Property(path) => write!(f, "{}", path),
            Expression::BinaryOp { left, op, right } => {
                write!(f, "({} {} {})", left, op.keyword(), right)
            }
            Expression::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => write!(f, "(not {})", operand),
            },
            Expression::FunctionCall { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// `Name` or `Address/City`; segments keep the casing the client used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    pub segments: Vec<String>,
}

impl PropertyPath {
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    pub fn first(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_single(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    pub fn from_keyword(keyword: &str) -> QueryResult<Self> {
        Ok(match keyword.to_ascii_lowercase().as_str() {
            "eq" => BinaryOperator::Eq,
            "ne" => BinaryOperator::Ne,
            "gt" => BinaryOperator::Gt,
            "ge" => BinaryOperator::Ge,
            "lt" => BinaryOperator::Lt,
            "le" => BinaryOperator::Le,
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            "add" => BinaryOperator::Add,
            "sub" => BinaryOperator::Sub,
            "mul" => BinaryOperator::Mul,
            "div" => BinaryOperator::Div,
            "mod" => BinaryOperator::Mod,
            _ => return Err(QueryError::UnknownOperator(keyword.to_string())),
        })
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "eq",
            BinaryOperator::Ne => "ne",
            BinaryOperator::Gt => "gt",
            BinaryOperator::Ge => "ge",
            BinaryOperator::Lt => "lt",
            BinaryOperator::Le => "le",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::Div => "div",
            BinaryOperator::Mod => "mod",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Gt
                | BinaryOperator::Ge
                | BinaryOperator::Lt
                | BinaryOperator::Le
        )
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
}

/// Built-in functions with their fixed argument counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Contains,
    StartsWith,
    EndsWith,
    Length,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    IndexOf,
    Substring,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Now,
    Round,
    Floor,
    Ceiling,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "contains" => Function::Contains,
            "startswith" => Function::StartsWith,
            "endswith" => Function::EndsWith,
            "length" => Function::Length,
            "tolower" => Function::ToLower,
            "toupper" => Function::ToUpper,
            "trim" => Function::Trim,
            "concat" => Function::Concat,
            "indexof" => Function::IndexOf,
            "substring" => Function::Substring,
            "year" => Function::Year,
            "month" => Function::Month,
            "day" => Function::Day,
            "hour" => Function::Hour,
            "minute" => Function::Minute,
            "second" => Function::Second,
            "now" => Function::Now,
            "round" => Function::Round,
            "floor" => Function::Floor,
            "ceiling" => Function::Ceiling,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Contains => "contains",
            Function::StartsWith => "startswith",
            Function::EndsWith => "endswith",
            Function::Length => "length",
            Function::ToLower => "tolower",
            Function::ToUpper => "toupper",
            Function::Trim => "trim",
            Function::Concat => "concat",
            Function::IndexOf => "indexof",
            Function::Substring => "substring",
            Function::Year => "year",
            Function::Month => "month",
            Function::Day => "day",
            Function::Hour => "hour",
            Function::Minute => "minute",
            Function::Second => "second",
            Function::Now => "now",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceiling => "ceiling",
        }
    }

    /// Accepted argument count as an inclusive range
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Function::Now => (0, 0),
            Function::Length
            | Function::ToLower
            | Function::ToUpper
            | Function::Trim
            | Function::Year
            | Function::Month
            | Function::Day
            | Function::Hour
            | Function::Minute
            | Function::Second
            | Function::Round
            | Function::Floor
            | Function::Ceiling => (1, 1),
            Function::Contains
            | Function::StartsWith
            | Function::EndsWith
            | Function::Concat
            | Function::IndexOf => (2, 2),
            Function::Substring => (2, 3),
        }
    }

    pub fn check_arity(&self, actual: usize) -> QueryResult<()> {
        let (min, max) = self.arity();
        if actual < min || actual > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(QueryError::InvalidArgumentCount {
                function: self.name().to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// Lexical category of a literal; the value is coerced when it is compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    String,
    Integer,
    Decimal,
    Boolean,
    Null,
    Guid,
    Date,
    DateTime,
    TimeOfDay,
    Geography,
}

/// A literal as written in the query; `raw` is the exact token text.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub kind: LiteralKind,
    pub raw: String,
}

impl Literal {
    pub fn new(kind: LiteralKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.kind == LiteralKind::Null
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expression: Expression,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    All,
    Property(PropertyPath),
}

/// `expr as Alias`
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeItem {
    pub expression: Expression,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchExpr {
    Term(String),
    Phrase(String),
    And(Box<SearchExpr>, Box<SearchExpr>),
    Or(Box<SearchExpr>, Box<SearchExpr>),
    Not(Box<SearchExpr>),
}

impl SearchExpr {
    /// Terms and phrases in textual order
    pub fn terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SearchExpr::Term(t) | SearchExpr::Phrase(t) => out.push(t),
            SearchExpr::And(l, r) | SearchExpr::Or(l, r) => {
                l.collect_terms(out);
                r.collect_terms(out);
            }
            SearchExpr::Not(inner) => inner.collect_terms(out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Levels {
    Count(usize),
    Max,
}

/// One `$expand` item; nested options apply to the last path segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpandItem {
    pub path: Vec<String>,
    pub filter: Option<Expression>,
    pub orderby: Vec<OrderByItem>,
    pub select: Vec<SelectItem>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
    pub search: Option<SearchExpr>,
    pub compute: Vec<ComputeItem>,
    pub expand: Vec<ExpandItem>,
    pub levels: Option<Levels>,
}

impl ExpandItem {
    pub fn new(path: Vec<String>) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    /// No options beyond a projection; eligible for the join strategy
    pub fn is_simple(&self) -> bool {
        self.filter.is_none()
            && self.orderby.is_empty()
            && self.skip.is_none()
            && self.top.is_none()
            && self.search.is_none()
            && self.compute.is_empty()
            && self.expand.is_empty()
            && self.levels.is_none()
            && self.path.len() == 1
    }

    /// Nesting depth contributed by this item and everything below it
    pub fn depth(&self) -> usize {
        let nested = self.expand.iter().map(ExpandItem::depth).max().unwrap_or(0);
        self.path.len() + nested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_keywords_round_trip() {
        for kw in ["eq", "ne", "gt", "ge", "lt", "le", "and", "or", "add", "sub", "mul", "div", "mod"] {
            assert_eq!(BinaryOperator::from_keyword(kw).unwrap().keyword(), kw);
        }
        assert!(matches!(
            BinaryOperator::from_keyword("like"),
            Err(QueryError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_function_arity() {
        assert!(Function::Contains.check_arity(2).is_ok());
        assert!(Function::Contains.check_arity(1).is_err());
        assert!(Function::Substring.check_arity(2).is_ok());
        assert!(Function::Substring.check_arity(3).is_ok());
        assert!(Function::Substring.check_arity(4).is_err());
        assert!(Function::Now.check_arity(0).is_ok());
    }

    #[test]
    fn test_display_is_fully_parenthesized() {
        let expr = Expression::binary(
            Expression::binary(
                Expression::property("Price"),
                BinaryOperator::Gt,
                Expression::Literal(Literal::new(LiteralKind::Integer, "5")),
            ),
            BinaryOperator::And,
            Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(Expression::FunctionCall {
                    function: Function::Contains,
                    args: vec![
                        Expression::property("Name"),
                        Expression::Literal(Literal::new(LiteralKind::String, "'x'")),
                    ],
                }),
            },
        );
        assert_eq!(
            expr.to_string(),
            "((Price gt 5) and (not contains(Name,'x')))"
        );
    }

    #[test]
    fn test_expand_depth() {
        let mut item = ExpandItem::new(vec!["Orders".into(), "Lines".into()]);
        item.expand.push(ExpandItem::new(vec!["Product".into()]));
        assert_eq!(item.depth(), 3);
        assert!(!item.is_simple());
        assert!(ExpandItem::new(vec!["Owner".into()]).is_simple());
    }
}
