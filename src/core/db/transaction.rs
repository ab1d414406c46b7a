/// Transaction Module
///
/// A transaction holds the execution lock from `BEGIN` until it is committed,
/// rolled back or dropped, so no other thread's statement can run in between.
use crate::core::db::connection::{ConnectionManager, SessionSlot};
use crate::core::db::driver::{ServerError, Session};
use crate::core::db::escape::{escape, EscapeStyle};
use crate::core::db::query::{QueryExecutor, RetryPolicy};
use crate::core::db::result::ResultSet;
use crate::core::{DbError, Result};
use std::sync::MutexGuard;
use tracing::{error, warn};

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// `BEGIN` succeeded and the lock is held
    InProgress,
    Committed,
    RolledBack,
    /// Commit or rollback was attempted and failed
    Failed,
}

/// An open transaction.
///
/// Dropping it without calling [`Transaction::commit`] or
/// [`Transaction::rollback`] rolls back; the lock is released in every case.
#[must_use = "dropping a transaction rolls it back"]
pub struct Transaction<'a> {
    slot: MutexGuard<'a, SessionSlot>,
    retry: &'a RetryPolicy,
    max_packet_size: u64,
    escape_style: EscapeStyle,
    state: TransactionState,
}

impl ConnectionManager {
    /// Starts a transaction.
    ///
    /// Takes the execution lock, sends `BEGIN` and keeps the lock in the
    /// returned handle. If `BEGIN` fails the lock is released and the error
    /// returned.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let mut slot = self.lock("begin")?;
        let session = slot.as_deref_mut().ok_or(DbError::NotConnected)?;
        QueryExecutor::new(session, self.retry_policy()).execute("BEGIN")?;

        Ok(Transaction {
            slot,
            retry: self.retry_policy(),
            max_packet_size: self.max_packet_size(),
            escape_style: self.escape_style(),
            state: TransactionState::InProgress,
        })
    }
}

impl<'a> Transaction<'a> {
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn max_packet_size(&self) -> u64 {
        self.max_packet_size
    }

    pub fn escape_string(&self, value: &str) -> String {
        escape(value.as_bytes(), self.escape_style)
    }

    /// Executes a statement inside the transaction, discarding any result.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        let retry = self.retry;
        QueryExecutor::new(self.session()?, retry).execute(sql)
    }

    /// Runs a query inside the transaction; `Ok(None)` means no rows.
    pub fn store_query(&mut self, sql: &str) -> Result<Option<ResultSet>> {
        let retry = self.retry;
        QueryExecutor::new(self.session()?, retry).store_query(sql)
    }

    /// Commits and releases the lock, whatever the outcome.
    pub fn commit(mut self) -> Result<()> {
        let outcome = self.session()?.commit();
        self.finish(outcome, TransactionState::Committed, "commit")
    }

    /// Rolls back and releases the lock, whatever the outcome.
    pub fn rollback(mut self) -> Result<()> {
        let outcome = self.session()?.rollback();
        self.finish(outcome, TransactionState::RolledBack, "rollback")
    }

    fn finish(
        &mut self,
        outcome: std::result::Result<(), ServerError>,
        done: TransactionState,
        operation: &str,
    ) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.state = done;
                Ok(())
            }
            Err(err) => {
                error!("[{}] {}", operation, err);
                self.state = TransactionState::Failed;
                Err(DbError::Transaction(err.message))
            }
        }
    }

    fn session(&mut self) -> Result<&mut (dyn Session + 'static)> {
        self.slot.as_deref_mut().ok_or(DbError::NotConnected)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state != TransactionState::InProgress {
            return;
        }
        warn!("Transaction dropped without commit or rollback; rolling back");
        if let Some(session) = self.slot.as_deref_mut() {
            if let Err(err) = session.rollback() {
                error!("[rollback] {}", err);
            }
        }
        self.state = TransactionState::RolledBack;
    }
}
