/// Client Library Module
///
/// The traits in this module are the boundary between the data-access layer
/// and the native client library that actually talks to the server. The
/// manager, executor and transaction code are written purely against
/// `Driver` and `Session`, which keeps them independent of the backend.
use crate::config::ConnectOptions;
use crate::core::db::escape::EscapeStyle;
use std::collections::VecDeque;
use std::fmt;

/// Client error: failed to connect through the local socket.
pub const CR_CONNECTION_ERROR: u32 = 2002;
/// Client error: failed to connect to the TCP host.
pub const CR_CONN_HOST_ERROR: u32 = 2003;
/// Client error: the server has gone away.
pub const CR_SERVER_GONE_ERROR: u32 = 2006;
/// Client error: connection lost during a query.
pub const CR_SERVER_LOST: u32 = 2013;
/// Server error: shutdown in progress.
pub const ER_SERVER_SHUTDOWN: u32 = 1053;
/// Client error with no more specific code.
pub const CR_UNKNOWN_ERROR: u32 = 2000;

/// Error codes that indicate the connection itself failed and the statement
/// may simply be sent again.
pub const TRANSIENT_ERROR_CODES: [u32; 5] = [
    CR_SERVER_LOST,
    CR_SERVER_GONE_ERROR,
    CR_CONN_HOST_ERROR,
    ER_SERVER_SHUTDOWN,
    CR_CONNECTION_ERROR,
];

/// An error code and message as reported by the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: u32,
    pub message: String,
}

impl ServerError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        ServerError {
            code,
            message: message.into(),
        }
    }

    /// Whether the failure belongs to the transient set and should be retried.
    pub fn is_transient(&self) -> bool {
        TRANSIENT_ERROR_CODES.contains(&self.code)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for ServerError {}

/// One row of raw field values; `None` is SQL NULL.
pub type Row = Vec<Option<Vec<u8>>>;

/// A result set fully buffered on the client side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredResult {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl StoredResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        StoredResult {
            columns,
            rows: rows.into(),
        }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Removes and returns the next buffered row.
    pub fn fetch_row(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }
}

/// Factory side of a client library.
pub trait Driver: Send + Sync {
    /// Short backend name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Creates a fresh, unconnected session handle.
    fn init(&self) -> Result<Box<dyn Session>, ServerError>;

    /// Literal escaping rules of this backend.
    fn escape_style(&self) -> EscapeStyle {
        EscapeStyle::Backslash
    }
}

/// A single connection handle.
///
/// Calls are never made concurrently: the manager keeps the session behind
/// its execution lock.
pub trait Session: Send {
    /// Enables or disables automatic reconnection of the transport.
    fn set_reconnect(&mut self, enabled: bool);

    /// Opens the session.
    fn real_connect(&mut self, options: &ConnectOptions) -> Result<(), ServerError>;

    /// Sends one statement.
    fn real_query(&mut self, sql: &str) -> Result<(), ServerError>;

    /// Retrieves the result of the last statement. `Ok(None)` means the
    /// statement does not produce a result set.
    fn store_result(&mut self) -> Result<Option<StoredResult>, ServerError>;

    fn commit(&mut self) -> Result<(), ServerError>;

    fn rollback(&mut self) -> Result<(), ServerError>;
}
