/// Database Module
///
/// This module provides the data-access layer, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Client library** (`driver.rs`): the `Driver`/`Session` traits every backend implements
/// - **SQLite backend** (`sqlite.rs`): the bundled `rusqlite` implementation of those traits
/// - **Connection Management** (`connection.rs`): the one session and its execution lock
/// - **Query Execution** (`query.rs`): sending statements with transient-error retry
/// - **Transactions** (`transaction.rs`): scoped handles that hold the lock until commit/rollback
/// - **Results** (`result.rs`): name-indexed, forward-only rows
/// - **Batch Inserts** (`insert.rs`): multi-row `INSERT` bounded by the packet size
/// - **Escaping** (`escape.rs`): quoted literals for embedding values in SQL text
///
/// ## Error Handling
///
/// All fallible operations return the crate's `DbError`. Column reads never
/// fail; they fall back to `0`, `""` or `None`.
pub mod connection;
pub mod driver;
pub mod escape;
pub mod insert;
pub mod query;
pub mod result;
pub mod sqlite;
pub mod transaction;

pub use connection::*;
pub use driver::{Driver, Row, ServerError, Session, StoredResult};
pub use escape::{escape, EscapeStyle};
pub use insert::*;
pub use query::*;
pub use result::*;
pub use sqlite::SqliteDriver;
pub use transaction::*;
