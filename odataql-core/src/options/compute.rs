//! `$compute`: `expr as Alias, ...`

use crate::ast::ComputeItem;
use crate::config::{Deadline, ParserConfig};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{TokenKind, Tokenizer, COMPUTE_RULES};
use crate::parser::Parser;

pub fn parse_compute(
    value: &str,
    config: &ParserConfig,
    deadline: Option<Deadline>,
) -> QueryResult<Vec<ComputeItem>> {
    let tokens = Tokenizer::new(&COMPUTE_RULES).tokenize_until(value, deadline)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax(0, "empty $compute"));
    }

    let mut parser = Parser::new(tokens, value.len())
        .with_deadline(deadline)
        .with_max_depth(config.max_expression_depth);
    let mut items: Vec<ComputeItem> = Vec::new();

    loop {
        let expression = parser.parse_expression()?;
        parser.expect(TokenKind::As)?;
        let alias = parser.expect(TokenKind::Identifier)?.value;
        if items.iter().any(|i| i.alias.eq_ignore_ascii_case(&alias)) {
            return Err(QueryError::validation(format!(
                "duplicate $compute alias '{}'",
                alias
            )));
        }
        items.push(ComputeItem { expression, alias });

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
