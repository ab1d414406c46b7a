// Core infrastructure modules
pub mod config;
pub mod core;

#[cfg(test)]
mod test_utils;

pub use crate::config::{load_config, Config, ConnectOptions, RetryConfig};
pub use crate::core::db::{
    BatchInsert, ConnectionManager, Driver, Execute, ResultSet, RetryPolicy, ServerError,
    Session, SqliteDriver, Transaction, TransactionState,
};
pub use crate::core::{DbError, Result};
