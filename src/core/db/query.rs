/// Query Execution Module
///
/// Sends statements over a session that the caller has already locked and
/// recovers from transient connection failures by resending.
use crate::config::RetryConfig;
use crate::core::db::driver::{ServerError, Session};
use crate::core::db::result::ResultSet;
use crate::core::{DbError, Result};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Statements are cut to this many characters in `execute` diagnostics.
pub const EXECUTE_LOG_LIMIT: usize = 256;

/// How transient failures are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Pause before each resend.
    pub delay: Duration,
    /// Transient failures tolerated per call; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delay: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            delay: config.delay(),
            max_attempts: config.max_attempts,
        }
    }
}

/// Query execution over one locked session.
pub struct QueryExecutor<'a> {
    session: &'a mut dyn Session,
    policy: &'a RetryPolicy,
    retries: u32,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given session
    pub fn new(session: &'a mut dyn Session, policy: &'a RetryPolicy) -> Self {
        QueryExecutor {
            session,
            policy,
            retries: 0,
        }
    }

    /// Number of transient failures this executor has slept through.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Sends a statement and discards whatever it returns.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Statement` when the server rejects the statement
    /// with a non-transient error, or `DbError::RetriesExhausted` under a
    /// bounded policy.
    pub fn execute(&mut self, sql: &str) -> Result<()> {
        self.send(sql, Some(EXECUTE_LOG_LIMIT))?;

        // the result has to be consumed even for statements that have none,
        // otherwise the connection is left out of sync
        if let Err(err) = self.session.store_result() {
            debug!("Discarding result failed: {}", err);
        }
        Ok(())
    }

    /// Sends a statement and fetches its rows.
    ///
    /// Returns `Ok(None)` when the statement produced no result set or the
    /// result set is empty; otherwise the result is positioned on its first
    /// row. A transient failure while fetching resends the whole statement.
    pub fn store_query(&mut self, sql: &str) -> Result<Option<ResultSet>> {
        loop {
            self.send(sql, None)?;

            match self.session.store_result() {
                Ok(Some(stored)) => {
                    let result = ResultSet::new(stored);
                    return Ok(result.has_next().then_some(result));
                }
                Ok(None) => {
                    debug!("Statement returned no result set: {}", sql);
                    return Ok(None);
                }
                Err(err) => {
                    error!("[store_result] {} (query: {})", err, sql);
                    if !err.is_transient() {
                        return Err(statement_error(err));
                    }
                    self.pause(&err)?;
                }
            }
        }
    }

    fn send(&mut self, sql: &str, log_limit: Option<usize>) -> Result<()> {
        loop {
            let Err(err) = self.session.real_query(sql) else {
                return Ok(());
            };

            let shown = log_limit.map_or(sql, |limit| truncate(sql, limit));
            if !err.is_transient() {
                error!("[real_query] {} (query: {})", err, shown);
                return Err(statement_error(err));
            }
            warn!("[real_query] {}; retrying (query: {})", err, shown);
            self.pause(&err)?;
        }
    }

    fn pause(&mut self, err: &ServerError) -> Result<()> {
        self.retries += 1;
        if let Some(max) = self.policy.max_attempts {
            if self.retries >= max {
                return Err(DbError::RetriesExhausted {
                    attempts: self.retries,
                    message: err.message.clone(),
                });
            }
        }
        thread::sleep(self.policy.delay);
        Ok(())
    }
}

fn statement_error(err: ServerError) -> DbError {
    DbError::Statement {
        code: err.code,
        message: err.message,
    }
}

/// The first `limit` characters of `sql`.
fn truncate(sql: &str, limit: usize) -> &str {
    match sql.char_indices().nth(limit) {
        Some((end, _)) => &sql[..end],
        None => sql,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::driver::{
        Driver, StoredResult, CR_SERVER_GONE_ERROR, CR_SERVER_LOST, ER_SERVER_SHUTDOWN,
    };
    use crate::test_utils::MockDriver;
    use std::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_millis(20),
            max_attempts: None,
        }
    }

    fn session(driver: &MockDriver) -> Box<dyn Session> {
        driver.init().unwrap()
    }

    #[test]
    fn test_transient_send_failures_are_retried() {
        let driver = MockDriver::new();
        driver.fail_sends(vec![
            ServerError::new(CR_SERVER_LOST, "Lost connection to MySQL server during query"),
            ServerError::new(CR_SERVER_GONE_ERROR, "MySQL server has gone away"),
            ServerError::new(ER_SERVER_SHUTDOWN, "Server shutdown in progress"),
        ]);
        let mut session = session(&driver);
        let policy = fast_policy();
        let mut executor = QueryExecutor::new(session.as_mut(), &policy);

        let started = Instant::now();
        executor.execute("UPDATE players SET online = 0").unwrap();

        assert_eq!(executor.retries(), 3);
        assert!(started.elapsed() >= Duration::from_millis(60));
        let state = driver.state();
        assert_eq!(state.attempts.len(), 4);
        assert_eq!(state.sent, vec!["UPDATE players SET online = 0"]);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let driver = MockDriver::new();
        driver.fail_sends(vec![ServerError::new(1064, "You have an error in your SQL syntax")]);
        let mut session = session(&driver);
        let policy = fast_policy();
        let mut executor = QueryExecutor::new(session.as_mut(), &policy);

        match executor.execute("SELEC 1") {
            Err(DbError::Statement { code, .. }) => assert_eq!(code, 1064),
            other => panic!("Expected statement error, got {other:?}"),
        }
        assert_eq!(executor.retries(), 0);
        assert_eq!(driver.state().attempts.len(), 1);
    }

    #[test]
    fn test_bounded_policy_gives_up() {
        let driver = MockDriver::new();
        driver.fail_sends(vec![ServerError::new(CR_SERVER_LOST, "lost"); 5]);
        let mut session = session(&driver);
        let policy = RetryPolicy {
            delay: Duration::from_millis(1),
            max_attempts: Some(2),
        };
        let mut executor = QueryExecutor::new(session.as_mut(), &policy);

        match executor.execute("DELETE FROM sessions") {
            Err(DbError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("Expected exhausted retries, got {other:?}"),
        }
        assert_eq!(driver.state().attempts.len(), 2);
    }

    #[test]
    fn test_store_query_returns_rows() {
        let driver = MockDriver::new().with_result(
            "SELECT id, name FROM players",
            StoredResult::new(
                vec!["id".to_string(), "name".to_string()],
                vec![
                    vec![Some(b"1".to_vec()), Some(b"Alice".to_vec())],
                    vec![Some(b"2".to_vec()), Some(b"Bob".to_vec())],
                ],
            ),
        );
        let mut session = session(&driver);
        let policy = fast_policy();
        let mut executor = QueryExecutor::new(session.as_mut(), &policy);

        let mut result = executor
            .store_query("SELECT id, name FROM players")
            .unwrap()
            .expect("rows");
        assert_eq!(result.get_string("name"), "Alice");
        assert!(result.next());
        assert_eq!(result.get_int("id"), 2);
        assert!(!result.next());
    }

    #[test]
    fn test_store_query_empty_results() {
        let driver = MockDriver::new().with_result(
            "SELECT id FROM players WHERE 0",
            StoredResult::new(vec!["id".to_string()], vec![]),
        );
        let mut session = session(&driver);
        let policy = fast_policy();
        let mut executor = QueryExecutor::new(session.as_mut(), &policy);

        assert!(executor
            .store_query("SELECT id FROM players WHERE 0")
            .unwrap()
            .is_none());
        // no result set at all
        assert!(executor.store_query("DELETE FROM players").unwrap().is_none());
    }

    #[test]
    fn test_transient_fetch_failure_resends_statement() {
        let driver = MockDriver::new().with_result(
            "SELECT 1 AS one",
            StoredResult::new(vec!["one".to_string()], vec![vec![Some(b"1".to_vec())]]),
        );
        driver.fail_fetches(vec![ServerError::new(CR_SERVER_LOST, "lost")]);
        let mut session = session(&driver);
        let policy = fast_policy();
        let mut executor = QueryExecutor::new(session.as_mut(), &policy);

        let result = executor.store_query("SELECT 1 AS one").unwrap().expect("row");
        assert_eq!(result.get_int("one"), 1);
        assert_eq!(executor.retries(), 1);
        assert_eq!(driver.state().sent, vec!["SELECT 1 AS one", "SELECT 1 AS one"]);
    }

    #[test]
    fn test_permanent_fetch_failure_surfaces() {
        let driver = MockDriver::new();
        driver.fail_fetches(vec![ServerError::new(2008, "MySQL client ran out of memory")]);
        let mut session = session(&driver);
        let policy = fast_policy();
        let mut executor = QueryExecutor::new(session.as_mut(), &policy);

        assert!(matches!(
            executor.store_query("SELECT * FROM items"),
            Err(DbError::Statement { code: 2008, .. })
        ));
        assert_eq!(driver.state().sent.len(), 1);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("short", 256), "short");
        let long = "x".repeat(300);
        assert_eq!(truncate(&long, 256).len(), 256);
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
