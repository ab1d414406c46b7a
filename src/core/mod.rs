/// Core Module
///
/// Shared infrastructure for the data-access layer: the database modules and
/// the error type they return.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};
