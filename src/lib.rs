pub mod batch;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod executor;
pub mod expand;
pub mod service;
pub mod sql;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use batch::{BatchProcessor, BatchRequest, BatchResponse};
pub use config::{ExpandStrategy, ServiceConfig};
pub use connection::{SqlConnection, SqliteConnection};
pub use context::RequestContext;
pub use error::{DbError, DbResult};
pub use executor::{compile_select, QueryExecutor, QueryResponse};
pub use service::{EntityService, Method, ServiceResponse};
pub use sql::{DialectKind, SqlValue};
pub use transaction::Transaction;

pub use odataql_core;
