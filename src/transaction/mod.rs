use std::sync::atomic::{AtomicU64, Ordering};

use crate::connection::SqlConnection;
use crate::context::RequestContext;
use crate::error::{DbError, DbResult};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Process-wide sequence number tagging a transaction in log lines
fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting statements
    Active,
    Committed,
    /// Rolled back, explicitly or on drop
    Aborted,
}

/// A database transaction scoped to one changeset or one multi-statement write.
///
/// Rolls back when dropped while still active, so every early return and
/// `?` inside a changeset leaves the database untouched.
pub struct Transaction<'c> {
    conn: &'c dyn SqlConnection,
    serial: u64,
    state: TransactionState,
}

impl<'c> Transaction<'c> {
    pub fn begin(conn: &'c dyn SqlConnection, ctx: &RequestContext) -> DbResult<Self> {
        let serial = next_serial();
        conn.begin(ctx).map_err(|e| match e {
            DbError::Cancelled | DbError::Timeout(_) => e,
            other => DbError::TransactionFailure(format!("begin failed: {}", other)),
        })?;
        tracing::debug!("Transaction #{} started", serial);
        Ok(Self {
            conn,
            serial,
            state: TransactionState::Active,
        })
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn connection(&self) -> &'c dyn SqlConnection {
        self.conn
    }

    /// Commit; on failure the transaction is rolled back before returning
    pub fn commit(mut self, ctx: &RequestContext) -> DbResult<()> {
        match self.conn.commit(ctx) {
            Ok(()) => {
                self.state = TransactionState::Committed;
                tracing::debug!("Transaction #{} committed", self.serial);
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(match e {
                    DbError::Cancelled | DbError::Timeout(_) => e,
                    other => DbError::TransactionFailure(format!("commit failed: {}", other)),
                })
            }
        }
    }

    pub fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if self.state != TransactionState::Active {
            return;
        }
        self.state = TransactionState::Aborted;
        match self.conn.rollback() {
            Ok(()) => tracing::debug!("Transaction #{} rolled back", self.serial),
            Err(e) => tracing::error!("Rollback of transaction #{} failed: {}", self.serial, e),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}
