//! `$expand` trees.
//!
//! ```text
//! expand := item ("," item)*
//! item   := Nav ("/" Nav)* [ "(" option ((";" | ",") option)* ")" ]
//! option := $name "=" value
//! ```
//!
//! The whole value is tokenized once with the expand rule set. Parentheses are
//! tracked with a depth counter so separators inside nested groups, function
//! calls and string literals are passed through untouched. Option values are
//! sliced out of the input by token position and handed to the grammar of
//! the option; a nested `$expand` recurses on its token slice directly.

use std::collections::HashSet;
use std::ops::Range;

use crate::ast::{ExpandItem, Levels};
use crate::config::{Deadline, ParserConfig};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{Token, TokenKind, Tokenizer, EXPAND_RULES};
use crate::parser::parse_filter_with;

use super::compute::parse_compute;
use super::orderby::parse_orderby;
use super::paging::{parse_skip, parse_top};
use super::search::parse_search;
use super::select::parse_select;

pub fn parse_expand(
    value: &str,
    config: &ParserConfig,
    deadline: Option<Deadline>,
) -> QueryResult<Vec<ExpandItem>> {
    let tokens = Tokenizer::new(&EXPAND_RULES).tokenize_until(value, deadline)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax(0, "empty $expand"));
    }

    let parser = ExpandParser {
        input: value,
        config,
        deadline,
    };
    let items = parser.parse_items(&tokens)?;

    for item in &items {
        if item.depth() > config.max_expand_depth {
            return Err(QueryError::validation(format!(
                "$expand depth {} exceeds the maximum of {}",
                item.depth(),
                config.max_expand_depth
            )));
        }
    }

    Ok(items)
}

struct ExpandParser<'a> {
    input: &'a str,
    config: &'a ParserConfig,
    deadline: Option<Deadline>,
}

/// One `$name=value` inside a group; `value` indexes the group's tokens
struct RawOption<'t> {
    name: &'t Token,
    value: Range<usize>,
}

impl<'a> ExpandParser<'a> {
    fn parse_items(&self, tokens: &[Token]) -> QueryResult<Vec<ExpandItem>> {
        let mut items = Vec::new();
        for range in split_top_level(tokens, |t| t.kind == TokenKind::Comma)? {
            let slice = &tokens[range];
            if slice.is_empty() {
                return Err(QueryError::syntax(
                    self.position_after(tokens),
                    "empty $expand item",
                ));
            }
            items.push(self.parse_item(slice)?);
        }
        Ok(items)
    }

    fn parse_item(&self, tokens: &[Token]) -> QueryResult<ExpandItem> {
        let mut path = Vec::new();
        let mut i = 0;
        loop {
            match tokens.get(i) {
                Some(t) if t.kind == TokenKind::Identifier => path.push(t.value.clone()),
                Some(t) => {
                    return Err(QueryError::syntax(
                        t.position,
                        format!("expected navigation property, found '{}'", t.value),
                    ))
                }
                None => {
                    return Err(QueryError::syntax(
                        self.position_after(tokens),
                        "expected navigation property",
                    ))
                }
            }
            i += 1;
            if tokens.get(i).map(|t| t.kind == TokenKind::Slash).unwrap_or(false) {
                i += 1;
            } else {
                break;
            }
        }

        let mut item = ExpandItem::new(path);
        let Some(open) = tokens.get(i) else {
            return Ok(item);
        };
        if open.kind != TokenKind::OpenParen {
            return Err(QueryError::syntax(
                open.position,
                format!("unexpected '{}' after navigation path", open.value),
            ));
        }

        let close = matching_paren(tokens, i)?;
        if close != tokens.len() - 1 {
            let extra = &tokens[close + 1];
            return Err(QueryError::syntax(
                extra.position,
                format!("unexpected '{}' after expand options", extra.value),
            ));
        }

        self.parse_options(&mut item, &tokens[i + 1..close], open.position)?;
        Ok(item)
    }

    fn parse_options(
        &self,
        item: &mut ExpandItem,
        tokens: &[Token],
        group_position: usize,
    ) -> QueryResult<()> {
        if tokens.is_empty() {
            return Err(QueryError::syntax(group_position, "empty expand option group"));
        }

        let mut options: Vec<RawOption<'_>> = Vec::new();
        let segments = split_top_level(tokens, |t| {
            t.kind == TokenKind::Semicolon || t.kind == TokenKind::Comma
        })?;
        for range in segments {
            let starts_option = tokens
                .get(range.start)
                .map(|t| t.kind == TokenKind::OptionName)
                .unwrap_or(false)
                && tokens
                    .get(range.start + 1)
                    .map(|t| t.kind == TokenKind::Equals)
                    .unwrap_or(false)
                && range.len() >= 2;

            if starts_option {
                options.push(RawOption {
                    name: &tokens[range.start],
                    value: range.start + 2..range.end,
                });
            } else if let Some(previous) = options.last_mut() {
                // `$orderby=Name,Price desc` continues across a separator
                previous.value.end = range.end;
            } else {
                let position = tokens
                    .get(range.start)
                    .map(|t| t.position)
                    .unwrap_or(group_position);
                return Err(QueryError::syntax(position, "expected $option=value"));
            }
        }

        let mut seen = HashSet::new();
        for option in options {
            let name = option.name.value.to_ascii_lowercase();
            if !seen.insert(name.clone()) && self.config.strict {
                return Err(QueryError::validation(format!(
                    "duplicate expand option '{}'",
                    option.name.value
                )));
            }

            let value_tokens = &tokens[option.value.clone()];
            let Some(raw) = self.slice(value_tokens) else {
                return Err(QueryError::syntax(
                    option.name.position,
                    format!("missing value for {}", option.name.value),
                ));
            };

            match name.as_str() {
                "$filter" => {
                    item.filter = Some(parse_filter_with(raw, self.config, self.deadline)?)
                }
                "$orderby" => item.orderby = parse_orderby(raw, self.config, self.deadline)?,
                "$select" => item.select = parse_select(raw, self.deadline)?,
                "$skip" => item.skip = Some(parse_skip(raw)?),
                "$top" => item.top = Some(parse_top(raw, self.config)?),
                "$search" => item.search = Some(parse_search(raw, self.config, self.deadline)?),
                "$compute" => item.compute = parse_compute(raw, self.config, self.deadline)?,
                "$expand" => item.expand = self.parse_items(value_tokens)?,
                "$levels" => item.levels = Some(parse_levels(raw, self.config)?),
                _ if self.config.strict => {
                    return Err(QueryError::validation(format!(
                        "unknown expand option '{}'",
                        option.name.value
                    )))
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Source text covered by a token slice
    fn slice(&self, tokens: &[Token]) -> Option<&'a str> {
        let first = tokens.first()?;
        let last = tokens.last()?;
        Some(&self.input[first.position..last.position + last.value.len()])
    }

    fn position_after(&self, tokens: &[Token]) -> usize {
        tokens
            .last()
            .map(|t| t.position + t.value.len())
            .unwrap_or(self.input.len())
    }
}

fn parse_levels(raw: &str, config: &ParserConfig) -> QueryResult<Levels> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("max") {
        return Ok(Levels::Max);
    }
    let levels: usize = raw
        .parse()
        .map_err(|_| QueryError::syntax(0, format!("$levels must be a positive integer or max, got '{}'", raw)))?;
    if levels == 0 || levels > config.max_expand_depth {
        return Err(QueryError::validation(format!(
            "$levels must be between 1 and {}, got {}",
            config.max_expand_depth, levels
        )));
    }
    Ok(Levels::Count(levels))
}

/// Split a token slice on separators that sit outside every parenthesis
fn split_top_level(
    tokens: &[Token],
    is_separator: impl Fn(&Token) -> bool,
) -> QueryResult<Vec<Range<usize>>> {
    let mut ranges = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    QueryError::syntax(token.position, "unbalanced ')' in $expand")
                })?;
            }
            _ if depth == 0 && is_separator(token) => {
                ranges.push(start..i);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        let position = tokens.last().map(|t| t.position).unwrap_or(0);
        return Err(QueryError::syntax(position, "unbalanced '(' in $expand"));
    }
    ranges.push(start..tokens.len());
    Ok(ranges)
}

fn matching_paren(tokens: &[Token], open: usize) -> QueryResult<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(QueryError::syntax(tokens[open].position, "unclosed '(' in $expand"))
}
