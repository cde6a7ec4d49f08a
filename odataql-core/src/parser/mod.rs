//! Expression parser for `$filter`, `$orderby` and `$compute`.
//!
//! Recursive descent over an explicit token cursor. A `Parser` lives for one
//! parse call only; nothing is shared between calls.

mod expressions;

pub(crate) use expressions::literal_kind;

use crate::ast::Expression;
use crate::config::{Deadline, ParserConfig};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{Token, TokenKind, Tokenizer};

/// Parser over a token stream
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
    /// Byte length of the input, reported as the position of end-of-input
    input_len: usize,
    deadline: Option<Deadline>,
    max_depth: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, input_len: usize) -> Self {
        Self {
            tokens,
            position: 0,
            input_len,
            deadline: None,
            max_depth: ParserConfig::default().max_expression_depth,
            depth: 0,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Deadline>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Current token, `None` at end of input
    pub(crate) fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    pub(crate) fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    pub(crate) fn current_is(&self, kind: TokenKind) -> bool {
        self.current().map(|t| t.kind == kind).unwrap_or(false)
    }

    pub(crate) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    pub(crate) fn current_position(&self) -> usize {
        self.current()
            .map(|t| t.position)
            .unwrap_or(self.input_len)
    }

    /// Consume a token of the given kind or fail with a syntax error
    pub(crate) fn expect(&mut self, kind: TokenKind) -> QueryResult<Token> {
        match self.current() {
            Some(token) if token.kind == kind => {
                let token = token.clone();
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(QueryError::syntax(
                token.position,
                format!("expected {:?}, found '{}'", kind, token.value),
            )),
            None => Err(QueryError::syntax(
                self.input_len,
                format!("expected {:?}, found end of input", kind),
            )),
        }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    pub(crate) fn check_deadline(&self) -> QueryResult<()> {
        if let Some(deadline) = self.deadline {
            if deadline.is_expired() {
                return Err(QueryError::Timeout(deadline.budget()));
            }
        }
        Ok(())
    }

    /// Track nesting so pathological input fails instead of exhausting the stack
    pub(crate) fn enter(&mut self) -> QueryResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(QueryError::syntax(
                self.current_position(),
                format!("expression nesting exceeds {} levels", self.max_depth),
            ));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Error for a token that cannot continue the expression
    pub(crate) fn unexpected(&self) -> QueryError {
        match self.current() {
            Some(token) if token.kind == TokenKind::Identifier => {
                QueryError::UnknownOperator(token.value.clone())
            }
            Some(token) => QueryError::syntax(
                token.position,
                format!("unexpected '{}'", token.value),
            ),
            None => QueryError::syntax(self.input_len, "unexpected end of input"),
        }
    }

    /// Parse one complete expression and require that nothing follows it
    pub fn parse_complete(&mut self) -> QueryResult<Expression> {
        let expr = self.parse_expression()?;
        if !self.at_end() {
            return Err(self.unexpected());
        }
        Ok(expr)
    }
}

/// Parse a `$filter` value with default limits
pub fn parse_filter(input: &str) -> QueryResult<Expression> {
    parse_filter_with(input, &ParserConfig::default(), None)
}

/// Parse a `$filter` value under the given limits and deadline
pub fn parse_filter_with(
    input: &str,
    config: &ParserConfig,
    deadline: Option<Deadline>,
) -> QueryResult<Expression> {
    let tokens = Tokenizer::filter().tokenize_until(input, deadline)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax(0, "empty expression"));
    }
    Parser::new(tokens, input.len())
        .with_deadline(deadline)
        .with_max_depth(config.max_expression_depth)
        .parse_complete()
}
