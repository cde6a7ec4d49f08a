//! Operator precedence chain for filter expressions.
//!
//! Precedence (lowest to highest):
//! 1. Logical OR: `or`
//! 2. Logical AND: `and`
//! 3. Comparison: `eq`, `ne`, `gt`, `ge`, `lt`, `le`
//! 4. Additive: `add`, `sub`
//! 5. Multiplicative: `mul`, `div`, `mod`
//! 6. Unary: `not`
//! 7. Primary: literals, properties, function calls, parentheses

use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::error::QueryResult;
use crate::lexer::TokenKind;
use crate::parser::Parser;

impl Parser {
    pub(super) fn parse_or_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_and_expression()?;

        while self.current_is(TokenKind::Or) {
            self.advance();
            let right = self.parse_and_expression()?;
            left = Expression::binary(left, BinaryOperator::Or, right);
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_comparison_expression()?;

        while self.current_is(TokenKind::And) {
            self.advance();
            let right = self.parse_comparison_expression()?;
            left = Expression::binary(left, BinaryOperator::And, right);
        }

        Ok(left)
    }

    fn parse_comparison_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_additive_expression()?;

        loop {
            match self.current() {
                Some(token) if token.kind == TokenKind::Comparison => {
                    let op = BinaryOperator::from_keyword(&token.value)?;
                    self.advance();
                    let right = self.parse_additive_expression()?;
                    left = Expression::binary(left, op, right);
                }
                // An identifier directly after an operand sits where an operator belongs
                Some(token) if token.kind == TokenKind::Identifier => {
                    return Err(self.unexpected());
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        while let Some(op) = self.current_arithmetic(&[BinaryOperator::Add, BinaryOperator::Sub]) {
            self.advance();
            let right = self.parse_multiplicative_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> QueryResult<Expression> {
        let mut left = self.parse_unary_expression()?;

        while let Some(op) = self.current_arithmetic(&[
            BinaryOperator::Mul,
            BinaryOperator::Div,
            BinaryOperator::Mod,
        ]) {
            self.advance();
            let right = self.parse_unary_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> QueryResult<Expression> {
        self.check_deadline()?;

        if self.current_is(TokenKind::Not) {
            self.advance();
            self.enter()?;
            let operand = self.parse_unary_expression()?;
            self.leave();
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }

        self.parse_primary_expression()
    }

    /// Arithmetic operator at the cursor, restricted to one precedence level
    fn current_arithmetic(&self, level: &[BinaryOperator]) -> Option<BinaryOperator> {
        let token = self.current()?;
        if token.kind != TokenKind::Arithmetic {
            return None;
        }
        BinaryOperator::from_keyword(&token.value)
            .ok()
            .filter(|op| level.contains(op))
    }
}
