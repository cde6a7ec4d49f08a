//! Connection abstraction the executor and batch processor run on.
//!
//! The host supplies the connection; this crate never opens pools or
//! provisions databases. [`SqliteConnection`] is the bundled implementation.

mod sqlite;

pub use sqlite::SqliteConnection;

use crate::context::RequestContext;
use crate::error::DbResult;
use crate::sql::{DialectKind, SqlValue};

/// Result of a data-modifying statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteOutcome {
    pub rows_affected: u64,
    /// Generated key of the last inserted row, when the backend reports one
    pub last_insert_id: Option<i64>,
}

/// A leased database connection.
///
/// Implementations must call [`RequestContext::check`] before running each
/// statement.
pub trait SqlConnection {
    fn dialect(&self) -> DialectKind;

    /// Run a SELECT and return every row as positional cells
    fn query(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<Vec<Vec<SqlValue>>>;

    fn execute(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<ExecuteOutcome>;

    fn begin(&self, ctx: &RequestContext) -> DbResult<()>;

    fn commit(&self, ctx: &RequestContext) -> DbResult<()>;

    /// Never consults the context: a cancelled request still rolls back
    fn rollback(&self) -> DbResult<()>;
}

impl<C: SqlConnection + ?Sized> SqlConnection for &C {
    fn dialect(&self) -> DialectKind {
        (**self).dialect()
    }

    fn query(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<Vec<Vec<SqlValue>>> {
        (**self).query(sql, params, ctx)
    }

    fn execute(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<ExecuteOutcome> {
        (**self).execute(sql, params, ctx)
    }

    fn begin(&self, ctx: &RequestContext) -> DbResult<()> {
        (**self).begin(ctx)
    }

    fn commit(&self, ctx: &RequestContext) -> DbResult<()> {
        (**self).commit(ctx)
    }

    fn rollback(&self) -> DbResult<()> {
        (**self).rollback()
    }
}
