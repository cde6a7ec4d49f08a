//! Parser limits shared by every option parser.

use std::time::{Duration, Instant};

use serde::Deserialize;

/// Limits and strictness applied while parsing query options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// `$top` used when the request does not carry one (default: 100)
    pub default_top: u64,
    /// Largest accepted `$top` (default: 10,000)
    pub max_top: u64,
    /// Maximum nesting of `$expand` items, path segments included (default: 5)
    pub max_expand_depth: usize,
    /// Reject duplicate and unknown `$` parameters instead of ignoring them
    pub strict: bool,
    /// Deadline for parsing a single request's options, in milliseconds
    pub parse_timeout_ms: Option<u64>,
    /// Maximum nesting of parentheses and unary operators in an expression
    pub max_expression_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_top: 100,
            max_top: 10_000,
            max_expand_depth: 5,
            strict: true,
            parse_timeout_ms: None,
            max_expression_depth: 64,
        }
    }
}

impl ParserConfig {
    /// Lenient configuration: unknown and duplicate parameters are ignored
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Deadline for a parse started now, if a timeout is configured
    pub fn deadline(&self) -> Option<Deadline> {
        self.parse_timeout_ms
            .map(|ms| Deadline::after(Duration::from_millis(ms)))
    }
}

/// Point in time after which parsing gives up with `QueryError::Timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}
