use std::path::Path;

use rusqlite::{params_from_iter, Connection};

use super::{ExecuteOutcome, SqlConnection};
use crate::context::RequestContext;
use crate::error::DbResult;
use crate::sql::{DialectKind, SqlValue};

/// [`SqlConnection`] over a single rusqlite connection
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Underlying rusqlite handle, for schema setup and inspection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run several `;`-separated statements without parameters
    pub fn execute_batch(&self, sql: &str, ctx: &RequestContext) -> DbResult<()> {
        self.prepare(ctx)?;
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Check the context and cap lock waits by the remaining budget
    fn prepare(&self, ctx: &RequestContext) -> DbResult<()> {
        ctx.check()?;
        if let Some(remaining) = ctx.remaining() {
            self.conn.busy_timeout(remaining)?;
        }
        Ok(())
    }
}

impl SqlConnection for SqliteConnection {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn query(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<Vec<Vec<SqlValue>>> {
        self.prepare(ctx)?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            ctx.check()?;
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(SqlValue::from(row.get_ref(i)?));
            }
            out.push(cells);
        }
        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[SqlValue], ctx: &RequestContext) -> DbResult<ExecuteOutcome> {
        self.prepare(ctx)?;
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows_affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(ExecuteOutcome {
            rows_affected: rows_affected as u64,
            last_insert_id: Some(self.conn.last_insert_rowid()),
        })
    }

    fn begin(&self, ctx: &RequestContext) -> DbResult<()> {
        self.prepare(ctx)?;
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self, ctx: &RequestContext) -> DbResult<()> {
        self.prepare(ctx)?;
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> DbResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}
