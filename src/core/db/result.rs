/// Result Set Module
///
/// Name-indexed, forward-only access to the rows of one executed query.
use crate::core::db::driver::{Row, StoredResult};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::error;

/// Rows returned by one query, read through a forward-only cursor.
///
/// The result set owns the buffered rows; values handed out by the getters
/// borrow from it and cannot outlive it.
#[derive(Debug)]
pub struct ResultSet {
    source: StoredResult,
    names: HashMap<String, usize>,
    current: Option<Row>,
}

impl ResultSet {
    /// Builds the column map and positions the cursor on the first row.
    pub fn new(mut source: StoredResult) -> Self {
        let mut names = HashMap::with_capacity(source.columns().len());
        for (index, name) in source.columns().iter().enumerate() {
            names.insert(name.clone(), index);
        }
        let current = source.fetch_row();

        ResultSet {
            source,
            names,
            current,
        }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        self.source.columns()
    }

    /// Reads an integer column.
    ///
    /// Absent columns and NULL values read as 0. Text is parsed like C
    /// `atoi`: leading whitespace, an optional sign and leading digits;
    /// anything else reads as 0.
    pub fn get_int(&self, column: &str) -> i64 {
        self.get_number(column)
    }

    /// Reads a numeric column as any `FromStr` type, with the same rules as
    /// [`ResultSet::get_int`]. Values that do not fit `T` read as the default.
    pub fn get_number<T: FromStr + Default>(&self, column: &str) -> T {
        match self.field(column, "get_number") {
            Some(bytes) => parse_leading_number(bytes),
            None => T::default(),
        }
    }

    /// Reads a text column; absent columns and NULL values read as `""`.
    pub fn get_string(&self, column: &str) -> String {
        self.field(column, "get_string")
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    /// Reads a binary column with its exact length.
    ///
    /// Returns `None` for absent columns and NULL values.
    pub fn get_stream(&self, column: &str) -> Option<&[u8]> {
        self.field(column, "get_stream")
    }

    /// Whether the cursor is positioned on a row.
    pub fn has_next(&self) -> bool {
        self.current.is_some()
    }

    /// Advances to the following row. Once this returns false the cursor
    /// stays past the end; there is no rewind.
    pub fn next(&mut self) -> bool {
        self.current = self.source.fetch_row();
        self.current.is_some()
    }

    fn field(&self, column: &str, operation: &str) -> Option<&[u8]> {
        let Some(&index) = self.names.get(column) else {
            error!("[{operation}] column '{column}' does not exist in result set");
            return None;
        };
        self.current
            .as_ref()?
            .get(index)?
            .as_deref()
    }
}

/// Parses the numeric prefix of `bytes` the way `atoi` does.
fn parse_leading_number<T: FromStr + Default>(bytes: &[u8]) -> T {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_start();

    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digit_len = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digit_len == 0 {
        return T::default();
    }

    let number = &trimmed[..sign_len + digit_len];
    number
        .strip_prefix('+')
        .unwrap_or(number)
        .parse()
        .unwrap_or_default()
}
