//! # odataql-core
//!
//! Storage-independent half of the OData query layer: tokenizer, expression
//! parser, system query option grammars, metadata model, resource paths and
//! an in-memory evaluator.
//!
//! Nothing in this crate touches a database. The root `odataql` crate
//! compiles [`QueryOptions`] into SQL and executes it.
//!
//! ## Example
//!
//! ```
//! use odataql_core::{QueryParser, ParserConfig};
//!
//! let parser = QueryParser::new(ParserConfig::default());
//! let options = parser
//!     .parse_query_string("$filter=Price gt 5 and contains(Name,'gad')&$top=10")
//!     .unwrap();
//! assert_eq!(options.top, 10);
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod metadata;
pub mod options;
pub mod parser;
pub mod resource;

pub use ast::{
    BinaryOperator, ComputeItem, ExpandItem, Expression, Function, Levels, Literal, LiteralKind,
    OrderByItem, PropertyPath, SearchExpr, SelectItem, SortDirection, UnaryOperator,
};
pub use config::{Deadline, ParserConfig};
pub use error::{QueryError, QueryResult};
pub use eval::{apply_compute, Evaluator, LiteralValue, Record};
pub use lexer::{Token, TokenKind, Tokenizer};
pub use metadata::{
    Cardinality, EdmType, EntityMetadata, JoinTable, MetadataProvider, MetadataRegistry,
    NavigationProperty, PropertyMetadata,
};
pub use options::{QueryOptions, QueryParser};
pub use parser::{parse_filter, parse_filter_with, Parser};
pub use resource::{EntityKey, ResourcePath};
