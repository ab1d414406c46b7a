/// Embedded SQLite backend.
///
/// Implements the client library traits on top of `rusqlite`. Result sets are
/// buffered when the statement is sent, so `store_result` only hands over the
/// rows. The server-variable lookup used at connect time is answered from
/// SQLite's own limits.
use crate::config::ConnectOptions;
use crate::core::db::driver::{
    Driver, Row, ServerError, Session, StoredResult, CR_SERVER_GONE_ERROR, CR_UNKNOWN_ERROR,
};
use crate::core::db::escape::EscapeStyle;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::limits::Limit;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};
use tracing::{debug, warn};

static SHOW_VARIABLES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*SHOW\s+(?:SESSION\s+|GLOBAL\s+)?VARIABLES\s+LIKE\s+'([^']*)'\s*;?\s*$")
        .expect("static regex")
});

/// Failures after which the open handle is unusable. The session closes it
/// and, with reconnect enabled, reopens the file on the next statement.
const FATAL_ERRORS: [ErrorCode; 3] = [
    ErrorCode::SystemIoFailure,
    ErrorCode::DatabaseCorrupt,
    ErrorCode::NotADatabase,
];

/// Driver for a local SQLite database file.
///
/// `ConnectOptions::database` is the file path; an empty name or `:memory:`
/// opens an in-memory database. Host, user, password, port and socket are not
/// used by this backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn init(&self) -> Result<Box<dyn Session>, ServerError> {
        Ok(Box::new(SqliteSession::default()))
    }

    fn escape_style(&self) -> EscapeStyle {
        EscapeStyle::Standard
    }
}

#[derive(Debug, Default)]
pub struct SqliteSession {
    conn: Option<Connection>,
    path: Option<String>,
    reconnect: bool,
    pending: Option<StoredResult>,
}

impl SqliteSession {
    fn connection(&mut self) -> Result<&Connection, ServerError> {
        if self.conn.is_none() && self.reconnect {
            if let Some(path) = self.path.clone() {
                debug!("Reopening SQLite database {}", path);
                self.conn = Some(open(&path)?);
            }
        }
        self.conn
            .as_ref()
            .ok_or_else(|| ServerError::new(CR_SERVER_GONE_ERROR, "SQLite database is not open"))
    }

    /// Converts a statement error, closing the handle if it is fatal.
    fn fail(&mut self, err: rusqlite::Error) -> ServerError {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if FATAL_ERRORS.contains(&failure.code) && self.conn.take().is_some() {
                warn!("Closed SQLite database after fatal error: {}", err);
            }
        }
        ServerError::from(err)
    }

    fn show_variables(&self, pattern: &str) -> StoredResult {
        let mut rows: Vec<Row> = Vec::new();
        if let Some(conn) = &self.conn {
            let max_sql_length = conn.limit(Limit::SQLITE_LIMIT_SQL_LENGTH);
            let variables = [("max_allowed_packet", max_sql_length.to_string())];
            for (name, value) in variables {
                if like_matches(pattern, name) {
                    rows.push(vec![Some(name.as_bytes().to_vec()), Some(value.into_bytes())]);
                }
            }
        }
        StoredResult::new(vec!["Variable_name".to_string(), "Value".to_string()], rows)
    }
}

impl Session for SqliteSession {
    fn set_reconnect(&mut self, enabled: bool) {
        self.reconnect = enabled;
    }

    fn real_connect(&mut self, options: &ConnectOptions) -> Result<(), ServerError> {
        let path = if options.database.is_empty() {
            ":memory:".to_string()
        } else {
            options.database.clone()
        };
        debug!("Opening SQLite database {}", path);
        self.conn = Some(open(&path)?);
        self.path = Some(path);
        Ok(())
    }

    fn real_query(&mut self, sql: &str) -> Result<(), ServerError> {
        self.pending = None;
        if let Some(captures) = SHOW_VARIABLES.captures(sql) {
            self.connection()?;
            self.pending = Some(self.show_variables(&captures[1]));
            return Ok(());
        }

        let outcome = run(self.connection()?, sql);
        match outcome {
            Ok(result) => {
                self.pending = result;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn store_result(&mut self) -> Result<Option<StoredResult>, ServerError> {
        Ok(self.pending.take())
    }

    fn commit(&mut self) -> Result<(), ServerError> {
        let outcome = self.connection()?.execute_batch("COMMIT");
        outcome.map_err(|err| self.fail(err))
    }

    fn rollback(&mut self) -> Result<(), ServerError> {
        let outcome = self.connection()?.execute_batch("ROLLBACK");
        outcome.map_err(|err| self.fail(err))
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => failure.extended_code as u32,
            _ => CR_UNKNOWN_ERROR,
        };
        ServerError::new(code, err.to_string())
    }
}

fn open(path: &str) -> Result<Connection, ServerError> {
    if path == ":memory:" {
        Connection::open_in_memory().map_err(ServerError::from)
    } else {
        Connection::open(path).map_err(ServerError::from)
    }
}

/// Runs one statement and buffers its rows, if it has any columns.
fn run(conn: &Connection, sql: &str) -> rusqlite::Result<Option<StoredResult>> {
    let mut stmt = conn.prepare(sql)?;
    let column_count = stmt.column_count();
    if column_count == 0 {
        stmt.execute([])?;
        return Ok(None);
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values: Row = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(raw_value(row.get_ref(i)?));
        }
        rows.push(values);
    }
    Ok(Some(StoredResult::new(columns, rows)))
}

/// Raw bytes of a value, in the textual form a network client would receive.
fn raw_value(value: ValueRef<'_>) -> Option<Vec<u8>> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string().into_bytes()),
        ValueRef::Real(f) => Some(f.to_string().into_bytes()),
        ValueRef::Text(t) => Some(t.to_vec()),
        ValueRef::Blob(b) => Some(b.to_vec()),
    }
}

/// `LIKE` matching for variable names: `%` matches any run, `_` one character.
fn like_matches(pattern: &str, name: &str) -> bool {
    fn matches(pattern: &[u8], name: &[u8]) -> bool {
        match pattern.split_first() {
            None => name.is_empty(),
            Some((b'%', rest)) => (0..=name.len()).any(|skip| matches(rest, &name[skip..])),
            Some((b'_', rest)) => !name.is_empty() && matches(rest, &name[1..]),
            Some((c, rest)) => {
                name.first().is_some_and(|n| n.eq_ignore_ascii_case(c)) && matches(rest, &name[1..])
            }
        }
    }
    matches(pattern.as_bytes(), name.as_bytes())
}
