/// Connection Management Module
///
/// This module owns the single session to the database server and the lock
/// that serializes every statement sent over it.
use crate::config::{ConnectOptions, RetryConfig};
use crate::core::db::driver::{Driver, Session};
use crate::core::db::escape::{escape, EscapeStyle};
use crate::core::db::query::{QueryExecutor, RetryPolicy};
use crate::core::db::result::ResultSet;
use crate::core::{DbError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Packet size assumed when the server does not report one (16 MiB).
pub const DEFAULT_MAX_PACKET_SIZE: u64 = 16 * 1024 * 1024;

/// Diagnostic query issued after connecting.
pub const MAX_PACKET_QUERY: &str = "SHOW VARIABLES LIKE 'max_allowed_packet'";

/// The session slot guarded by the execution lock.
pub(crate) type SessionSlot = Option<Box<dyn Session>>;

/// Owner of the one connection and its execution lock.
///
/// Share it between threads with an `Arc`; every statement takes the lock
/// for its whole send and fetch cycle, so statements never overlap on the
/// connection.
pub struct ConnectionManager {
    driver: Box<dyn Driver>,
    session: Mutex<SessionSlot>,
    // readable without the execution lock, which a transaction may hold
    connected: AtomicBool,
    max_packet_size: u64,
    retry: RetryPolicy,
}

impl ConnectionManager {
    /// Creates an unconnected manager with the default retry policy
    pub fn new(driver: impl Driver + 'static) -> Self {
        ConnectionManager {
            driver: Box::new(driver),
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Creates an unconnected manager using the `[retry]` settings
    pub fn from_config(driver: impl Driver + 'static, retry: &RetryConfig) -> Self {
        Self::new(driver).with_retry_policy(retry.into())
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Opens the session and reads the server's maximum packet size.
    ///
    /// Failure to create the handle or to connect is logged and returned as
    /// `DbError::Connect`; it is not retried. Calling this on a connected
    /// manager returns `DbError::AlreadyConnected`.
    pub fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.is_connected() {
            return Err(DbError::AlreadyConnected);
        }

        let driver = self.driver.name();
        let mut session = self.driver.init().map_err(|err| {
            error!("Failed to initialize {} connection handle: {}", driver, err);
            DbError::Connect(err.message)
        })?;
        session.set_reconnect(true);
        if let Err(err) = session.real_connect(options) {
            error!("{} connect error: {}", driver, err);
            return Err(DbError::Connect(err.message));
        }
        info!(
            "Connected to {} database '{}' at {}:{}",
            driver, options.database, options.host, options.port
        );

        *self
            .session
            .get_mut()
            .map_err(|_| DbError::LockPoisoned("connect"))? = Some(session);
        self.connected.store(true, Ordering::Release);

        match self.store_query(MAX_PACKET_QUERY) {
            Ok(Some(result)) => {
                let size: u64 = result.get_number("Value");
                if size > 0 {
                    self.max_packet_size = size;
                }
            }
            Ok(None) => debug!("Server did not report max_allowed_packet"),
            Err(err) => warn!("Could not read max_allowed_packet: {}", err),
        }
        debug!("Max packet size is {} bytes", self.max_packet_size);
        Ok(())
    }

    /// Largest statement the server accepts, as discovered by `connect`.
    pub fn max_packet_size(&self) -> u64 {
        self.max_packet_size
    }

    /// Checks if there's an active session.
    ///
    /// Does not take the execution lock, so it is safe inside a transaction.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Quotes and escapes text for embedding in a statement.
    ///
    /// Does not take the execution lock, so it is safe inside a transaction.
    pub fn escape_string(&self, value: &str) -> String {
        escape(value.as_bytes(), self.escape_style())
    }

    /// Quotes and escapes raw bytes for embedding in a statement.
    ///
    /// Bytes that are not valid text come out as a hex literal, so the value
    /// is stored unchanged.
    pub fn escape_blob(&self, value: &[u8]) -> String {
        escape(value, self.escape_style())
    }

    pub(crate) fn escape_style(&self) -> EscapeStyle {
        self.driver.escape_style()
    }

    /// Executes a statement, discarding any result.
    ///
    /// Transient connection errors are retried while holding the lock.
    pub fn execute(&self, sql: &str) -> Result<()> {
        let mut slot = self.lock("execute")?;
        let session = slot.as_deref_mut().ok_or(DbError::NotConnected)?;
        QueryExecutor::new(session, &self.retry).execute(sql)
    }

    /// Executes a query and returns its rows.
    ///
    /// `Ok(None)` means no rows. The lock is released before returning.
    pub fn store_query(&self, sql: &str) -> Result<Option<ResultSet>> {
        let mut slot = self.lock("store_query")?;
        let session = slot.as_deref_mut().ok_or(DbError::NotConnected)?;
        QueryExecutor::new(session, &self.retry).store_query(sql)
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Acquires the execution lock.
    pub(crate) fn lock(&self, context: &'static str) -> Result<MutexGuard<'_, SessionSlot>> {
        self.session
            .lock()
            .map_err(|_| DbError::LockPoisoned(context))
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("driver", &self.driver.name())
            .field("connected", &self.is_connected())
            .field("max_packet_size", &self.max_packet_size)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(slot) = self.session.get_mut() {
            if slot.take().is_some() {
                self.connected.store(false, Ordering::Release);
                debug!("Closed {} connection", self.driver.name());
            }
        }
    }
}
