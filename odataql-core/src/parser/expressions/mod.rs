//! Expression parsing.
//!
//! `precedence` holds the binary operator chain, this module the leaves:
//! literals, property paths, parenthesized groups and function calls.

mod precedence;

use crate::ast::{BinaryOperator, Expression, Function, Literal, LiteralKind, PropertyPath};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{Token, TokenKind};
use crate::parser::Parser;

impl Parser {
    /// Parse an expression at the lowest precedence (`or`)
    pub fn parse_expression(&mut self) -> QueryResult<Expression> {
        self.parse_or_expression()
    }

    pub(super) fn parse_primary_expression(&mut self) -> QueryResult<Expression> {
        self.check_deadline()?;

        let token = match self.current() {
            Some(token) => token.clone(),
            None => return Err(self.unexpected()),
        };

        if let Some(kind) = literal_kind(&token) {
            self.advance();
            return Ok(Expression::Literal(Literal::new(kind, token.value)));
        }

        let next_is_paren = self
            .peek(1)
            .map(|t| t.kind == TokenKind::OpenParen)
            .unwrap_or(false);

        match token.kind {
            TokenKind::OpenParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_expression()?;
                self.leave();
                if !self.current_is(TokenKind::CloseParen) {
                    return Err(match self.current() {
                        Some(t) if t.kind == TokenKind::Identifier => self.unexpected(),
                        _ => QueryError::syntax(self.current_position(), "expected ')'"),
                    });
                }
                self.advance();
                Ok(inner)
            }
            TokenKind::Identifier if next_is_paren => self.parse_function_call(&token),
            TokenKind::Arithmetic if next_is_paren => self.parse_arithmetic_call(&token),
            TokenKind::Identifier => self.parse_property_path(),
            _ => Err(QueryError::syntax(
                token.position,
                format!("unexpected '{}'", token.value),
            )),
        }
    }

    /// `Name` or `Address/City`
    fn parse_property_path(&mut self) -> QueryResult<Expression> {
        let mut segments = vec![self.expect(TokenKind::Identifier)?.value];
        while self.current_is(TokenKind::Slash) {
            self.advance();
            segments.push(self.expect(TokenKind::Identifier)?.value);
        }
        Ok(Expression::Property(PropertyPath { segments }))
    }

    fn parse_function_call(&mut self, name: &Token) -> QueryResult<Expression> {
        let function = Function::from_name(&name.value)
            .ok_or_else(|| QueryError::UnknownFunction(name.value.clone()))?;
        self.advance(); // function name
        let args = self.parse_call_arguments()?;
        function.check_arity(args.len())?;
        Ok(Expression::FunctionCall { function, args })
    }

    /// Function-call form of the arithmetic operators: `add(Price, 5)`
    fn parse_arithmetic_call(&mut self, name: &Token) -> QueryResult<Expression> {
        let op = BinaryOperator::from_keyword(&name.value)?;
        self.advance();
        let args = self.parse_call_arguments()?;
        let actual = args.len();
        let mut args = args.into_iter();
        match (args.next(), args.next(), args.next()) {
            (Some(left), Some(right), None) => Ok(Expression::binary(left, op, right)),
            _ => Err(QueryError::InvalidArgumentCount {
                function: name.keyword(),
                expected: "2".to_string(),
                actual,
            }),
        }
    }

    fn parse_call_arguments(&mut self) -> QueryResult<Vec<Expression>> {
        self.expect(TokenKind::OpenParen)?;
        self.enter()?;
        let mut args = Vec::new();
        if !self.current_is(TokenKind::CloseParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.current_is(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if !self.current_is(TokenKind::CloseParen) {
            return Err(match self.current() {
                Some(t) if t.kind == TokenKind::Identifier => self.unexpected(),
                _ => QueryError::syntax(self.current_position(), "expected ',' or ')'"),
            });
        }
        self.advance();
        self.leave();
        Ok(args)
    }
}

pub(crate) fn literal_kind(token: &Token) -> Option<LiteralKind> {
    Some(match token.kind {
        TokenKind::String => LiteralKind::String,
        TokenKind::Integer => LiteralKind::Integer,
        TokenKind::Decimal => LiteralKind::Decimal,
        TokenKind::Boolean => LiteralKind::Boolean,
        TokenKind::Null => LiteralKind::Null,
        TokenKind::Guid => LiteralKind::Guid,
        TokenKind::Date => LiteralKind::Date,
        TokenKind::DateTime => LiteralKind::DateTime,
        TokenKind::TimeOfDay => LiteralKind::TimeOfDay,
        TokenKind::Geography => LiteralKind::Geography,
        _ => return None,
    })
}
