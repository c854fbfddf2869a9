//! Per-execution-context connection state.
//!
//! A [`DbContext`] belongs to one logical unit of work (a request, a job, a
//! worker thread). It holds at most one [`LazyConnection`] and the current
//! transaction nesting depth. Contexts are never shared; give each thread or
//! task its own.

use std::fmt;

use transwarp_core::{Cursor, RawConnection, Result, TransactionError};

use crate::engine::{Engine, global_engine};

/// A connection that is only opened when a cursor is first requested.
pub struct LazyConnection {
    engine: Engine,
    raw: Option<Box<dyn RawConnection>>,
}

impl LazyConnection {
    /// Create a handle that will connect through `engine` on first use.
    pub fn new(engine: Engine) -> Self {
        Self { engine, raw: None }
    }

    /// Whether the raw connection has been opened.
    pub fn is_open(&self) -> bool {
        self.raw.is_some()
    }

    /// Borrow a cursor, opening the raw connection on the first call.
    pub fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        if self.raw.is_none() {
            self.raw = Some(self.engine.connect()?);
            tracing::debug!(driver = %self.engine.driver_name(), "Opened lazy connection");
        }
        match self.raw.as_deref_mut() {
            Some(raw) => raw.cursor(),
            None => Err(TransactionError::no_active_connection().into()),
        }
    }

    /// Commit on the raw connection.
    pub fn commit(&mut self) -> Result<()> {
        tracing::trace!("Commit");
        self.raw_mut()?.commit()
    }

    /// Roll back on the raw connection.
    pub fn rollback(&mut self) -> Result<()> {
        tracing::trace!("Rollback");
        self.raw_mut()?.rollback()
    }

    /// Close the raw connection if one was opened.
    ///
    /// The handle is cleared before closing, so calling this again is a no-op
    /// even when the close itself failed.
    pub fn cleanup(&mut self) -> Result<()> {
        match self.raw.take() {
            Some(raw) => {
                tracing::debug!("Closing connection");
                raw.close()
            }
            None => Ok(()),
        }
    }

    fn raw_mut(&mut self) -> Result<&mut (dyn RawConnection + 'static)> {
        self.raw
            .as_deref_mut()
            .ok_or_else(|| TransactionError::no_active_connection().into())
    }
}

impl Drop for LazyConnection {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(error = %e, "Failed to close connection on drop");
        }
    }
}

impl fmt::Debug for LazyConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyConnection")
            .field("driver", &self.engine.driver_name())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Connection state for one logical execution context.
///
/// Scopes borrow the context mutably for their whole lifetime, so the
/// context itself is the only place state lives:
///
/// - `connection` is set between the outermost scope's enter and exit;
/// - `transactions` counts the open [`TransactionScope`](crate::TransactionScope)s.
pub struct DbContext {
    engine: Engine,
    connection: Option<LazyConnection>,
    transactions: usize,
}

impl DbContext {
    /// Create an idle context that connects through `engine`.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            connection: None,
            transactions: 0,
        }
    }

    /// Create an idle context bound to the process-wide engine.
    pub fn from_global() -> Result<Self> {
        Ok(Self::new(global_engine()?))
    }

    /// The engine this context connects through.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// True while a scope has set up a connection.
    pub fn is_init(&self) -> bool {
        self.connection.is_some()
    }

    /// True once a statement has actually opened the raw connection.
    pub fn is_open(&self) -> bool {
        self.connection.as_ref().is_some_and(LazyConnection::is_open)
    }

    /// Number of transaction scopes currently entered.
    pub fn transaction_depth(&self) -> usize {
        self.transactions
    }

    /// Attach a fresh lazy connection and reset the transaction depth.
    ///
    /// Calling this on an initialized context logs a warning and keeps the
    /// existing connection.
    pub fn init(&mut self) {
        if self.is_init() {
            tracing::warn!("init() called on an initialized context; keeping the existing connection");
            return;
        }
        self.connection = Some(LazyConnection::new(self.engine.clone()));
        self.transactions = 0;
        tracing::trace!("Context initialized");
    }

    /// Close the connection (if opened) and detach it.
    pub fn cleanup(&mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        tracing::trace!(opened = connection.is_open(), "Context cleanup");
        connection.cleanup()
    }

    /// Borrow a cursor from the context's connection, opening it if needed.
    pub fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        match self.connection.as_mut() {
            Some(connection) => connection.cursor(),
            None => Err(TransactionError::no_active_connection().into()),
        }
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut LazyConnection> {
        self.connection.as_mut()
    }

    pub(crate) fn enter_transaction(&mut self) -> usize {
        self.transactions += 1;
        self.transactions
    }

    pub(crate) fn exit_transaction(&mut self) -> usize {
        self.transactions = self.transactions.saturating_sub(1);
        self.transactions
    }
}

impl fmt::Debug for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("engine", &self.engine)
            .field("connection", &self.connection)
            .field("transactions", &self.transactions)
            .finish()
    }
}
