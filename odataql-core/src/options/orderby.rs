//! `$orderby` lists: `expr [asc|desc], ...`

use crate::ast::{OrderByItem, SortDirection};
use crate::config::{Deadline, ParserConfig};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{TokenKind, Tokenizer, ORDERBY_RULES};
use crate::parser::Parser;

pub fn parse_orderby(
    value: &str,
    config: &ParserConfig,
    deadline: Option<Deadline>,
) -> QueryResult<Vec<OrderByItem>> {
    let tokens = Tokenizer::new(&ORDERBY_RULES).tokenize_until(value, deadline)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax(0, "empty $orderby"));
    }

    let mut parser = Parser::new(tokens, value.len())
        .with_deadline(deadline)
        .with_max_depth(config.max_expression_depth);
    let mut items = Vec::new();

    loop {
        let expression = parser.parse_expression()?;
        let direction = if parser.current_is(TokenKind::Desc) {
            parser.advance();
            SortDirection::Desc
        } else {
            if parser.current_is(TokenKind::Asc) {
                parser.advance();
            }
            SortDirection::Asc
        };
        items.push(OrderByItem {
            expression,
            direction,
        });

        if parser.current_is(TokenKind::Comma) {
            parser.advance();
        } else if parser.at_end() {
            break;
        } else {
            return Err(parser.unexpected());
        }
    }

    Ok(items)
}
