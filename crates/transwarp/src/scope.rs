//! Connection and transaction scopes.
//!
//! Both guards borrow a [`DbContext`] mutably and dereference to it, so the
//! body of a scope (and any nested scope) goes through the guard:
//!
//! ```ignore
//! let mut tx = ctx.transaction();
//! tx.update("INSERT INTO users (name) VALUES (?)", &["Ada".into()])?;
//! {
//!     let mut inner = tx.transaction();
//!     inner.update("UPDATE users SET name = ? WHERE id = 1", &["Grace".into()])?;
//!     inner.commit()?; // depth 2 -> 1, nothing reaches the database yet
//! }
//! tx.commit()?; // depth 1 -> 0, COMMIT
//! ```
//!
//! Nesting is flat: only the outermost [`TransactionScope`] commits or rolls
//! back, and only the scope that initialized the context closes the
//! connection. A guard that is dropped without an explicit exit takes the
//! failure path, so `?` and panics never leak a connection or an open
//! transaction.

use std::ops::{Deref, DerefMut};

use transwarp_core::{Error, TransactionError};

use crate::context::DbContext;

/// Enter the context, initializing it if no outer scope did.
fn acquire(ctx: &mut DbContext) -> bool {
    if ctx.is_init() {
        false
    } else {
        ctx.init();
        true
    }
}

/// Clean up the context when this scope created its connection.
fn release(ctx: &mut DbContext, owns_connection: bool) -> transwarp_core::Result<()> {
    if owns_connection { ctx.cleanup() } else { Ok(()) }
}

/// Guarantees an active connection for its lifetime.
///
/// The scope that found the context uninitialized owns the connection and
/// closes it on exit; nested scopes reuse it untouched.
#[must_use = "the connection is released as soon as the scope is dropped"]
pub struct ConnectionScope<'ctx> {
    ctx: &'ctx mut DbContext,
    owns_connection: bool,
    exited: bool,
}

impl<'ctx> ConnectionScope<'ctx> {
    /// Enter a connection scope on `ctx`.
    pub fn enter(ctx: &'ctx mut DbContext) -> Self {
        let owns_connection = acquire(ctx);
        tracing::trace!(owns_connection, "Entered connection scope");
        Self {
            ctx,
            owns_connection,
            exited: false,
        }
    }

    /// Whether this scope initialized the context.
    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }

    /// Leave the scope, returning any error from closing the connection.
    pub fn exit(mut self) -> transwarp_core::Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> transwarp_core::Result<()> {
        if self.exited {
            return Ok(());
        }
        self.exited = true;
        tracing::trace!(owns_connection = self.owns_connection, "Exiting connection scope");
        release(self.ctx, self.owns_connection)
    }
}

impl Deref for ConnectionScope<'_> {
    type Target = DbContext;

    fn deref(&self) -> &DbContext {
        &*self.ctx
    }
}

impl DerefMut for ConnectionScope<'_> {
    fn deref_mut(&mut self) -> &mut DbContext {
        &mut *self.ctx
    }
}

impl Drop for ConnectionScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "Failed to release connection on scope exit");
        }
    }
}

/// Where a [`TransactionScope`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// The body is running.
    Entered,
    /// The outermost scope is committing.
    Committing,
    /// The outermost scope is rolling back.
    RollingBack,
    /// Exit has run; the guard is inert.
    Exited,
}

/// A flat-nested transaction boundary.
///
/// Finish with [`commit`](Self::commit) on success or
/// [`rollback`](Self::rollback) on failure. Dropping the guard without
/// either is treated as a failure.
#[must_use = "dropping a transaction scope without commit() rolls it back"]
pub struct TransactionScope<'ctx> {
    ctx: &'ctx mut DbContext,
    owns_connection: bool,
    state: ScopeState,
}

impl<'ctx> TransactionScope<'ctx> {
    /// Enter a transaction scope on `ctx`.
    pub fn begin(ctx: &'ctx mut DbContext) -> Self {
        let owns_connection = acquire(ctx);
        let depth = ctx.enter_transaction();
        tracing::debug!(depth, owns_connection, "Entered transaction scope");
        Self {
            ctx,
            owns_connection,
            state: ScopeState::Entered,
        }
    }

    /// Whether this scope initialized the context.
    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// Leave the scope on the success path.
    ///
    /// Commits when this is the outermost transaction. Fails with
    /// `CommitFailed` if the driver rejected the commit (a recovery rollback
    /// has been attempted).
    pub fn commit(mut self) -> transwarp_core::Result<()> {
        self.finish(true)
    }

    /// Leave the scope on the failure path.
    ///
    /// Rolls back when this is the outermost transaction. A nested scope
    /// only leaves; its caller decides whether the failure reaches the
    /// outermost scope.
    pub fn rollback(mut self) -> transwarp_core::Result<()> {
        self.finish(false)
    }

    fn finish(&mut self, success: bool) -> transwarp_core::Result<()> {
        if self.state == ScopeState::Exited {
            return Ok(());
        }

        let depth = self.ctx.exit_transaction();
        tracing::debug!(depth, success, "Exiting transaction scope");

        let outcome = if depth > 0 {
            Ok(())
        } else if success {
            self.state = ScopeState::Committing;
            self.commit_outermost()
        } else {
            self.state = ScopeState::RollingBack;
            self.rollback_outermost()
        };
        self.state = ScopeState::Exited;

        let cleanup = release(self.ctx, self.owns_connection);
        match (outcome, cleanup) {
            (Ok(()), cleanup) => cleanup,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                tracing::warn!(
                    error = %cleanup_err,
                    "Failed to release connection after transaction error"
                );
                Err(e)
            }
        }
    }

    fn commit_outermost(&mut self) -> transwarp_core::Result<()> {
        let Some(connection) = self.ctx.connection_mut().filter(|c| c.is_open()) else {
            tracing::debug!("Transaction never touched the database; nothing to commit");
            return Ok(());
        };

        match connection.commit() {
            Ok(()) => {
                tracing::debug!("Committed transaction");
                Ok(())
            }
            Err(commit_err) => {
                tracing::warn!(error = %commit_err, "Commit failed; rolling back");
                if let Err(rollback_err) = connection.rollback() {
                    tracing::error!(
                        error = %rollback_err,
                        commit_error = %commit_err,
                        "Rollback after failed commit also failed"
                    );
                }
                Err(TransactionError::commit_failed(commit_err).into())
            }
        }
    }

    fn rollback_outermost(&mut self) -> transwarp_core::Result<()> {
        let Some(connection) = self.ctx.connection_mut().filter(|c| c.is_open()) else {
            tracing::debug!("Transaction never touched the database; nothing to roll back");
            return Ok(());
        };

        match connection.rollback() {
            Ok(()) => {
                tracing::debug!("Rolled back transaction");
                Ok(())
            }
            Err(e) => Err(TransactionError::rollback_failed(e).into()),
        }
    }
}

impl Deref for TransactionScope<'_> {
    type Target = DbContext;

    fn deref(&self) -> &DbContext {
        &*self.ctx
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut DbContext {
        &mut *self.ctx
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.state == ScopeState::Exited {
            return;
        }
        if std::thread::panicking() {
            tracing::warn!("Transaction scope unwound by a panic; rolling back");
        } else {
            tracing::debug!("Transaction scope dropped without commit; rolling back");
        }
        if let Err(e) = self.finish(false) {
            tracing::error!(error = %e, "Transaction exit failed during drop");
        }
    }
}

/// Run `f` inside a [`ConnectionScope`].
///
/// The body's error is returned as is; a cleanup failure is returned only
/// when the body succeeded.
pub fn with_connection<T, E, F>(ctx: &mut DbContext, f: F) -> Result<T, E>
where
    F: FnOnce(&mut DbContext) -> Result<T, E>,
    E: From<Error>,
{
    let mut scope = ConnectionScope::enter(ctx);
    let result = f(&mut *scope);
    let exit = scope.exit();
    match result {
        Ok(value) => {
            exit?;
            Ok(value)
        }
        Err(err) => {
            if let Err(cleanup_err) = exit {
                tracing::warn!(error = %cleanup_err, "Failed to release connection after body error");
            }
            Err(err)
        }
    }
}

/// Run `f` inside a [`TransactionScope`], committing on `Ok` and rolling
/// back on `Err`.
///
/// If the body failed and the rollback failed too, the rollback failure is
/// returned and the body's error is logged.
pub fn with_transaction<T, E, F>(ctx: &mut DbContext, f: F) -> Result<T, E>
where
    F: FnOnce(&mut DbContext) -> Result<T, E>,
    E: From<Error> + std::fmt::Display,
{
    let mut scope = TransactionScope::begin(ctx);
    match f(&mut *scope) {
        Ok(value) => {
            scope.commit()?;
            Ok(value)
        }
        Err(err) => match scope.rollback() {
            Ok(()) => Err(err),
            Err(rollback_err) => {
                tracing::error!(
                    error = %rollback_err,
                    body_error = %err,
                    "Rollback failed; superseding the transaction body's error"
                );
                Err(rollback_err.into())
            }
        },
    }
}

impl DbContext {
    /// Enter a [`ConnectionScope`] on this context.
    pub fn connection_scope(&mut self) -> ConnectionScope<'_> {
        ConnectionScope::enter(self)
    }

    /// Enter a [`TransactionScope`] on this context.
    pub fn transaction(&mut self) -> TransactionScope<'_> {
        TransactionScope::begin(self)
    }

    /// Method form of [`with_connection`].
    pub fn with_connection<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut DbContext) -> Result<T, E>,
        E: From<Error>,
    {
        with_connection(self, f)
    }

    /// Method form of [`with_transaction`].
    pub fn with_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut DbContext) -> Result<T, E>,
        E: From<Error> + std::fmt::Display,
    {
        with_transaction(self, f)
    }
}
