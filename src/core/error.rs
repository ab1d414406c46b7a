/// Error Module
///
/// This module defines the error type returned by every fallible operation in
/// the data-access layer. Transient connection failures are handled inside the
/// retry loop and only surface here when a bounded retry policy gives up.
use thiserror::Error;

/// Error type for the data-access layer.
///
/// This enum covers the failures a caller can observe:
/// - Connection setup (handle creation, connect, double connect)
/// - Statement execution rejected by the server
/// - Transactions and the execution lock
/// - Batch inserts that cannot fit into one packet
/// - Configuration loading
#[derive(Error, Debug)]
pub enum DbError {
    /// The initial connection could not be established
    #[error("Connection error: {0}")]
    Connect(String),

    /// The server rejected a statement with a non-transient error
    #[error("Statement error {code}: {message}")]
    Statement { code: u32, message: String },

    /// A bounded retry policy ran out of attempts on a transient error
    #[error("Gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// An operation needed a live session but `connect` never succeeded
    #[error("Not connected")]
    NotConnected,

    /// `connect` was called on a manager that already owns a session
    #[error("Already connected")]
    AlreadyConnected,

    /// A thread panicked while holding the execution lock
    #[error("Execution lock poisoned in {0}")]
    LockPoisoned(&'static str),

    /// Commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A single row is larger than the server accepts in one statement
    #[error("Row of {len} bytes cannot fit in a packet of {max} bytes")]
    RowTooLarge { len: usize, max: u64 },

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
