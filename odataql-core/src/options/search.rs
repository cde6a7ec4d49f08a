//! `$search` expressions.
//!
//! ```text
//! or_expr  := and_expr (OR and_expr)*
//! and_expr := not_expr ([AND] not_expr)*      adjacency is an implicit AND
//! not_expr := NOT not_expr | primary
//! primary  := word | "phrase" | ( or_expr )
//! ```

use crate::ast::SearchExpr;
use crate::config::{Deadline, ParserConfig};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{TokenKind, Tokenizer, SEARCH_RULES};
use crate::parser::Parser;

pub fn parse_search(
    value: &str,
    config: &ParserConfig,
    deadline: Option<Deadline>,
) -> QueryResult<SearchExpr> {
    let tokens = Tokenizer::new(&SEARCH_RULES).tokenize_until(value, deadline)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax(0, "empty $search"));
    }
    let mut parser = Parser::new(tokens, value.len())
        .with_deadline(deadline)
        .with_max_depth(config.max_expression_depth);
    let expr = parser.parse_search_or()?;
    if !parser.at_end() {
        return Err(QueryError::syntax(
            parser.current_position(),
            "unexpected token in $search",
        ));
    }
    Ok(expr)
}

impl Parser {
    fn parse_search_or(&mut self) -> QueryResult<SearchExpr> {
        let mut left = self.parse_search_and()?;
        while self.current_is(TokenKind::Or) {
            self.advance();
            let right = self.parse_search_and()?;
            left = SearchExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_search_and(&mut self) -> QueryResult<SearchExpr> {
        let mut left = self.parse_search_not()?;
        loop {
            if self.current_is(TokenKind::And) {
                self.advance();
            } else if !self.starts_search_operand() {
                break;
            }
            let right = self.parse_search_not()?;
            left = SearchExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_search_not(&mut self) -> QueryResult<SearchExpr> {
        self.check_deadline()?;
        if self.current_is(TokenKind::Not) {
            self.advance();
            self.enter()?;
            let inner = self.parse_search_not()?;
            self.leave();
            return Ok(SearchExpr::Not(Box::new(inner)));
        }
        self.parse_search_primary()
    }

    fn parse_search_primary(&mut self) -> QueryResult<SearchExpr> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(QueryError::syntax(self.current_position(), "expected search term")),
        };
        match token.kind {
            TokenKind::Word => Ok(SearchExpr::Term(token.value)),
            TokenKind::Phrase => Ok(SearchExpr::Phrase(unquote_phrase(&token.value))),
            TokenKind::OpenParen => {
                self.enter()?;
                let inner = self.parse_search_or()?;
                self.leave();
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            _ => Err(QueryError::syntax(
                token.position,
                format!("unexpected '{}' in $search", token.value),
            )),
        }
    }

    fn starts_search_operand(&self) -> bool {
        matches!(
            self.current().map(|t| t.kind),
            Some(TokenKind::Word | TokenKind::Phrase | TokenKind::Not | TokenKind::OpenParen)
        )
    }
}

fn unquote_phrase(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: &str) -> QueryResult<SearchExpr> {
        parse_search(value, &ParserConfig::default(), None)
    }

    #[test]
    fn test_implicit_and() {
        let expr = parse("blue sky").unwrap();
        assert_eq!(
            expr,
            SearchExpr::And(
                Box::new(SearchExpr::Term("blue".into())),
                Box::new(SearchExpr::Term("sky".into()))
            )
        );
    }

    #[test]
    fn test_operators_and_phrases() {
        let expr = parse("\"red car\" OR (bike AND NOT \"old \\\"one\\\"\")").unwrap();
        assert_eq!(expr.terms(), vec!["red car", "bike", "old \"one\""]);
        assert!(matches!(expr, SearchExpr::Or(_, _)));
    }

    #[test]
    fn test_search_errors() {
        assert!(parse("").is_err());
        assert!(parse("(blue").is_err());
        assert!(parse("blue OR").is_err());
        assert!(parse("blue)").is_err());
    }
}
