/// Batch Insert Module
///
/// Collects row tuples into one multi-row `INSERT` and sends it before it
/// would grow past the server's maximum packet size.
use crate::core::db::connection::ConnectionManager;
use crate::core::db::transaction::Transaction;
use crate::core::{DbError, Result};
use tracing::{error, warn};

/// Something that statements can be sent through.
pub trait Execute {
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Size limit for a single statement.
    fn max_packet_size(&self) -> u64;
}

impl Execute for &ConnectionManager {
    fn execute(&mut self, sql: &str) -> Result<()> {
        ConnectionManager::execute(self, sql)
    }

    fn max_packet_size(&self) -> u64 {
        ConnectionManager::max_packet_size(self)
    }
}

impl Execute for Transaction<'_> {
    fn execute(&mut self, sql: &str) -> Result<()> {
        Transaction::execute(self, sql)
    }

    fn max_packet_size(&self) -> u64 {
        Transaction::max_packet_size(self)
    }
}

impl<T: Execute + ?Sized> Execute for &mut T {
    fn execute(&mut self, sql: &str) -> Result<()> {
        (**self).execute(sql)
    }

    fn max_packet_size(&self) -> u64 {
        (**self).max_packet_size()
    }
}

/// Multi-row insert buffer.
///
/// ```no_run
/// # use dblayer::{BatchInsert, ConnectionManager, SqliteDriver};
/// # fn run(db: &ConnectionManager) -> dblayer::core::Result<()> {
/// let mut insert = BatchInsert::new(db, "INSERT INTO items (id, name) VALUES ");
/// for id in 0..1000 {
///     insert.add_row(&format!("{id}, {}", db.escape_string("sword")))?;
/// }
/// insert.execute()?;
/// # Ok(())
/// # }
/// ```
pub struct BatchInsert<E: Execute> {
    target: E,
    prefix: String,
    values: String,
}

impl<E: Execute> BatchInsert<E> {
    /// `prefix` is the statement up to and including `VALUES`.
    pub fn new(target: E, prefix: impl Into<String>) -> Self {
        BatchInsert {
            target,
            prefix: prefix.into(),
            values: String::new(),
        }
    }

    /// Appends `(row)` to the buffer.
    ///
    /// If the statement would exceed the max packet size, the rows collected
    /// so far are sent first. When that send fails the error is returned and
    /// `row` is not added.
    pub fn add_row(&mut self, row: &str) -> Result<()> {
        let max = self.target.max_packet_size();
        let tuple_len = row.len() + 2;
        if (self.prefix.len() + tuple_len) as u64 > max {
            error!(
                "Row of {} bytes does not fit in a {} byte packet",
                row.len(),
                max
            );
            return Err(DbError::RowTooLarge { len: row.len(), max });
        }

        let separator_len = usize::from(!self.values.is_empty());
        if (self.statement_len() + separator_len + tuple_len) as u64 > max {
            self.execute()?;
        }

        self.values.reserve(tuple_len + 1);
        if !self.values.is_empty() {
            self.values.push(',');
        }
        self.values.push('(');
        self.values.push_str(row);
        self.values.push(')');
        Ok(())
    }

    /// Adds the contents of `row` and clears it, so the buffer can be reused
    /// for the next row.
    pub fn add_row_buf(&mut self, row: &mut String) -> Result<()> {
        let outcome = self.add_row(row);
        row.clear();
        outcome
    }

    /// Sends the collected rows. Does nothing if there are none.
    ///
    /// The buffer is emptied whether or not the statement succeeds.
    pub fn execute(&mut self) -> Result<()> {
        if self.values.is_empty() {
            return Ok(());
        }

        let mut statement = String::with_capacity(self.statement_len());
        statement.push_str(&self.prefix);
        statement.push_str(&self.values);
        self.values.clear();
        self.target.execute(&statement)
    }

    /// Whether no rows are waiting to be sent.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Byte length of the statement `execute` would send right now.
    pub fn statement_len(&self) -> usize {
        self.prefix.len() + self.values.len()
    }
}

impl<E: Execute> Drop for BatchInsert<E> {
    fn drop(&mut self) {
        if !self.values.is_empty() {
            warn!(
                "Batch insert dropped with {} unsent bytes: {}",
                self.values.len(),
                self.prefix
            );
        }
    }
}
