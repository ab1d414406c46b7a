/// # Test Utilities Module
///
/// Scripted client library for exercising the executor, manager, transaction
/// and batch code without a server:
/// - Queued send / fetch failures to drive the retry loop
/// - Canned result sets keyed by statement text
/// - A record of every statement, commit and rollback the session saw
/// - Detection of overlapping statements on the one connection
use crate::config::ConnectOptions;
use crate::core::db::connection::{ConnectionManager, MAX_PACKET_QUERY};
use crate::core::db::driver::{Driver, ServerError, Session, StoredResult};
use crate::core::db::query::RetryPolicy;
use crate::core::db::sqlite::SqliteDriver;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Everything the mock session was told, plus what it should answer.
#[derive(Debug, Default)]
pub struct MockState {
    /// Every `real_query` call, failed or not
    pub attempts: Vec<String>,
    /// Statements that were accepted
    pub sent: Vec<String>,
    pub send_failures: VecDeque<ServerError>,
    pub fetch_failures: VecDeque<ServerError>,
    pub results: HashMap<String, StoredResult>,
    pub init_error: Option<ServerError>,
    pub connect_error: Option<ServerError>,
    pub commit_error: Option<ServerError>,
    pub reconnect: bool,
    pub connected_with: Option<ConnectOptions>,
    pub commits: usize,
    pub rollbacks: usize,
    pub sessions_dropped: usize,
    /// Simulated server time per accepted statement
    pub statement_delay: Duration,
    /// Statements that started while another one was still in flight
    pub interleaved: usize,
    in_flight: bool,
    pending: Option<StoredResult>,
}

/// A `Driver` whose sessions all share one `MockState`.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `sql` with `result`.
    pub fn with_result(self, sql: &str, result: StoredResult) -> Self {
        self.state().results.insert(sql.to_string(), result);
        self
    }

    /// Reports `size` as the server's `max_allowed_packet`.
    pub fn with_max_packet(self, size: u64) -> Self {
        self.with_result(MAX_PACKET_QUERY, packet_size_result(size))
    }

    pub fn fail_sends(&self, errors: Vec<ServerError>) {
        self.state().send_failures.extend(errors);
    }

    pub fn fail_fetches(&self, errors: Vec<ServerError>) {
        self.state().fetch_failures.extend(errors);
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Accepted statements, minus the packet size probe issued by `connect`.
    pub fn statements(&self) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter(|sql| sql.as_str() != MAX_PACKET_QUERY)
            .cloned()
            .collect()
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn init(&self) -> Result<Box<dyn Session>, ServerError> {
        if let Some(err) = self.state().init_error.take() {
            return Err(err);
        }
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Session for MockSession {
    fn set_reconnect(&mut self, enabled: bool) {
        self.state().reconnect = enabled;
    }

    fn real_connect(&mut self, options: &ConnectOptions) -> Result<(), ServerError> {
        let mut state = self.state();
        if let Some(err) = state.connect_error.take() {
            return Err(err);
        }
        state.connected_with = Some(options.clone());
        Ok(())
    }

    fn real_query(&mut self, sql: &str) -> Result<(), ServerError> {
        let delay = {
            let mut state = self.state();
            state.attempts.push(sql.to_string());
            if let Some(err) = state.send_failures.pop_front() {
                return Err(err);
            }
            if state.in_flight {
                state.interleaved += 1;
            }
            state.in_flight = true;
            state.sent.push(sql.to_string());
            state.pending = state.results.get(sql).cloned();
            state.statement_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn store_result(&mut self) -> Result<Option<StoredResult>, ServerError> {
        let mut state = self.state();
        state.in_flight = false;
        if let Some(err) = state.fetch_failures.pop_front() {
            return Err(err);
        }
        Ok(state.pending.take())
    }

    fn commit(&mut self) -> Result<(), ServerError> {
        let mut state = self.state();
        state.commits += 1;
        match state.commit_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn rollback(&mut self) -> Result<(), ServerError> {
        self.state().rollbacks += 1;
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.state().sessions_dropped += 1;
    }
}

/// Result of `SHOW VARIABLES LIKE 'max_allowed_packet'`.
pub fn packet_size_result(size: u64) -> StoredResult {
    StoredResult::new(
        vec!["Variable_name".to_string(), "Value".to_string()],
        vec![vec![
            Some(b"max_allowed_packet".to_vec()),
            Some(size.to_string().into_bytes()),
        ]],
    )
}

/// Retry policy with a short delay so retry tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        delay: Duration::from_millis(10),
        max_attempts: None,
    }
}

/// A manager connected to `driver` with the fast retry policy.
pub fn connected_mock(driver: &MockDriver) -> ConnectionManager {
    let mut db = ConnectionManager::new(driver.clone()).with_retry_policy(fast_retry());
    db.connect(&ConnectOptions::default())
        .expect("mock connect");
    db
}

/// A manager connected to a fresh in-memory SQLite database.
pub fn connected_sqlite() -> ConnectionManager {
    let mut db = ConnectionManager::new(SqliteDriver).with_retry_policy(fast_retry());
    db.connect(&ConnectOptions::default())
        .expect("sqlite connect");
    db
}
