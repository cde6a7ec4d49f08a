//! System query options.
//!
//! `QueryParser` turns a query string (or already-decoded parameter pairs)
//! into a `QueryOptions` value. The parser only holds its configuration, so a
//! single instance can be shared by every request handler.

mod compute;
mod expand;
mod orderby;
mod paging;
mod search;
mod select;
mod validate;

pub use compute::parse_compute;
pub use expand::parse_expand;
pub use orderby::parse_orderby;
pub use paging::{parse_count, parse_skip, parse_top};
pub use search::parse_search;
pub use select::parse_select;
pub use validate::validate;

use std::collections::HashSet;

use crate::ast::{ComputeItem, ExpandItem, Expression, OrderByItem, SearchExpr, SelectItem};
use crate::config::ParserConfig;
use crate::error::{QueryError, QueryResult};
use crate::metadata::EntityMetadata;
use crate::parser::parse_filter_with;

/// Parsed query options of one request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub filter: Option<Expression>,
    pub expand: Vec<ExpandItem>,
    pub select: Vec<SelectItem>,
    pub orderby: Vec<OrderByItem>,
    pub skip: Option<u64>,
    /// Explicit `$top`, or the configured default
    pub top: u64,
    pub search: Option<SearchExpr>,
    pub compute: Vec<ComputeItem>,
    pub count: bool,
}

impl QueryOptions {
    /// Options of a request without any query string
    pub fn with_defaults(config: &ParserConfig) -> Self {
        Self {
            filter: None,
            expand: Vec::new(),
            select: Vec::new(),
            orderby: Vec::new(),
            skip: None,
            top: config.default_top,
            search: None,
            compute: Vec::new(),
            count: false,
        }
    }

    pub fn compute_alias(&self, name: &str) -> Option<&ComputeItem> {
        self.compute
            .iter()
            .find(|c| c.alias.eq_ignore_ascii_case(name))
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::with_defaults(&ParserConfig::default())
    }
}

const KNOWN_OPTIONS: &[&str] = &[
    "$filter", "$expand", "$select", "$orderby", "$skip", "$top", "$search", "$compute", "$count",
];

/// Stateless query option parser
#[derive(Debug, Clone, Default)]
pub struct QueryParser {
    config: ParserConfig,
}

impl QueryParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a raw query string (without the leading `?`)
    pub fn parse_query_string(&self, query: &str) -> QueryResult<QueryOptions> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self.parse_params(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Parse already-decoded parameter pairs
    pub fn parse_params<'p>(
        &self,
        params: impl IntoIterator<Item = (&'p str, &'p str)>,
    ) -> QueryResult<QueryOptions> {
        let config = &self.config;
        let deadline = config.deadline();
        let mut options = QueryOptions::with_defaults(config);
        let mut seen = HashSet::new();

        for (name, value) in params {
            if !name.starts_with('$') {
                continue;
            }
            let key = name.to_ascii_lowercase();
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                if config.strict {
                    return Err(QueryError::validation(format!(
                        "unknown query option '{}'",
                        name
                    )));
                }
                continue;
            }
            if !seen.insert(key.clone()) {
                if config.strict {
                    return Err(QueryError::validation(format!(
                        "query option '{}' specified more than once",
                        name
                    )));
                }
                continue;
            }

            match key.as_str() {
                "$filter" => options.filter = Some(parse_filter_with(value, config, deadline)?),
                "$expand" => options.expand = parse_expand(value, config, deadline)?,
                "$select" => options.select = parse_select(value, deadline)?,
                "$orderby" => options.orderby = parse_orderby(value, config, deadline)?,
                "$skip" => options.skip = Some(parse_skip(value)?),
                "$top" => options.top = parse_top(value, config)?,
                "$search" => options.search = Some(parse_search(value, config, deadline)?),
                "$compute" => options.compute = parse_compute(value, config, deadline)?,
                "$count" => options.count = parse_count(value)?,
                _ => {}
            }
        }

        Ok(options)
    }

    /// Parse and validate against the entity the request addresses
    pub fn parse_for_entity(
        &self,
        query: &str,
        entity: &EntityMetadata,
        metadata: &dyn crate::metadata::MetadataProvider,
    ) -> QueryResult<QueryOptions> {
        let options = self.parse_query_string(query)?;
        validate(&options, entity, metadata, &self.config)?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SortDirection;

    #[test]
    fn test_absent_top_defaults_to_100() {
        let options = QueryParser::default().parse_query_string("").unwrap();
        assert_eq!(options.top, 100);
        assert_eq!(options.skip, None);
        assert!(!options.count);
    }

    #[test]
    fn test_top_bounds() {
        let parser = QueryParser::default();
        assert!(parser.parse_query_string("$top=-1").is_err());
        assert_eq!(parser.parse_query_string("$top=10000").unwrap().top, 10000);
        assert!(parser.parse_query_string("$top=10001").is_err());
        assert!(parser.parse_query_string("$skip=-3").is_err());
    }

    #[test]
    fn test_option_names_are_case_insensitive() {
        let parser = QueryParser::default();
        let a = parser.parse_query_string("$filter=Name eq 'x'").unwrap();
        let b = parser.parse_query_string("$FILTER=Name EQ 'x'").unwrap();
        let c = parser.parse_query_string("$Filter=Name eq 'x'").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_percent_encoded_values() {
        let options = QueryParser::default()
            .parse_query_string("%24filter=Name%20eq%20%27a%26b%27&$orderby=Price%20desc")
            .unwrap();
        assert_eq!(options.filter.unwrap().to_string(), "(Name eq 'a&b')");
        assert_eq!(options.orderby[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_duplicates_and_unknown_options() {
        let strict = QueryParser::default();
        assert!(strict.parse_query_string("$top=1&$TOP=2").is_err());
        assert!(strict.parse_query_string("$frobnicate=1").is_err());
        assert!(strict.parse_query_string("custom=1&$top=3").is_ok());

        let lenient = QueryParser::new(ParserConfig::lenient());
        let options = lenient.parse_query_string("$top=1&$top=2&$frobnicate=1").unwrap();
        assert_eq!(options.top, 1);
    }

    #[test]
    fn test_all_options_together() {
        let options = QueryParser::default()
            .parse_query_string(
                "$filter=Price gt 5&$expand=Items($top=2)&$select=Name,Total&$orderby=Name\
                 &$skip=10&$top=20&$search=blue&$compute=Price mul 2 as Total&$count=true",
            )
            .unwrap();
        assert!(options.filter.is_some());
        assert_eq!(options.expand.len(), 1);
        assert_eq!(options.select.len(), 2);
        assert_eq!(options.orderby.len(), 1);
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.top, 20);
        assert!(options.search.is_some());
        assert!(options.compute_alias("total").is_some());
        assert!(options.count);
    }

    #[test]
    fn test_parser_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QueryParser>();
        assert_send_sync::<QueryOptions>();
    }
}
