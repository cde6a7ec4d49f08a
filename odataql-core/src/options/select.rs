//! `$select` lists.

use crate::ast::{PropertyPath, SelectItem};
use crate::config::Deadline;
use crate::error::{QueryError, QueryResult};
use crate::lexer::{TokenKind, Tokenizer, SELECT_RULES};

pub fn parse_select(value: &str, deadline: Option<Deadline>) -> QueryResult<Vec<SelectItem>> {
    let tokens = Tokenizer::new(&SELECT_RULES).tokenize_until(value, deadline)?;
    let mut items = Vec::new();
    let mut iter = tokens.iter().peekable();

    loop {
        match iter.next() {
            Some(token) if token.kind == TokenKind::Star => items.push(SelectItem::All),
            Some(token) if token.kind == TokenKind::Identifier => {
                let mut segments = vec![token.value.clone()];
                while iter.peek().map(|t| t.kind == TokenKind::Slash).unwrap_or(false) {
                    iter.next();
                    match iter.next() {
                        Some(t) if t.kind == TokenKind::Identifier => segments.push(t.value.clone()),
                        Some(t) => {
                            return Err(QueryError::syntax(
                                t.position,
                                format!("expected property name after '/', found '{}'", t.value),
                            ))
                        }
                        None => {
                            return Err(QueryError::syntax(
                                value.len(),
                                "expected property name after '/'",
                            ))
                        }
                    }
                }
                items.push(SelectItem::Property(PropertyPath { segments }));
            }
            Some(token) => {
                return Err(QueryError::syntax(
                    token.position,
                    format!("unexpected '{}' in $select", token.value),
                ))
            }
            None => return Err(QueryError::syntax(value.len(), "empty $select item")),
        }

        match iter.next() {
            Some(token) if token.kind == TokenKind::Comma => continue,
            Some(token) => {
                return Err(QueryError::syntax(
                    token.position,
                    format!("expected ',' in $select, found '{}'", token.value),
                ))
            }
            None => break,
        }
    }

    Ok(items)
}
