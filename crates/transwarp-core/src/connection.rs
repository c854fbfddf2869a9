//! Driver-facing connection traits.
//!
//! The lifecycle layer treats a driver connection as opaque. A driver only
//! has to provide:
//!
//! - [`Cursor`] - executes statements against a borrowed connection
//! - [`RawConnection`] - hands out cursors and finishes the open transaction
//! - [`Connector`] - opens brand-new raw connections from an [`EngineConfig`]
//!
//! Connections are used from one logical context at a time, so all methods
//! take `&mut self` and the traits are object safe.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A statement executor borrowed from a [`RawConnection`].
pub trait Cursor {
    /// Execute a query and return all rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement (INSERT, UPDATE, DELETE, DDL) and return rows affected.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Id generated by the last INSERT through this cursor, if the driver reports one.
    fn last_insert_id(&self) -> Option<i64> {
        None
    }
}

/// A live driver connection.
///
/// Drivers follow DB-API semantics: statements run inside an implicit
/// transaction that stays open until [`commit`](RawConnection::commit) or
/// [`rollback`](RawConnection::rollback).
pub trait RawConnection: Send {
    /// Borrow a cursor for executing statements.
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Close the connection, reporting driver errors.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Strategy that opens new raw connections.
///
/// Each call to [`connect`](Connector::connect) must return a brand-new
/// connection; connectors never pool.
pub trait Connector: Send + Sync {
    /// Open a new connection using the given parameters.
    fn connect(&self, config: &EngineConfig) -> Result<Box<dyn RawConnection>>;

    /// Short driver name used in log output.
    fn driver_name(&self) -> &str {
        "custom"
    }
}

impl<F> Connector for F
where
    F: Fn(&EngineConfig) -> Result<Box<dyn RawConnection>> + Send + Sync,
{
    fn connect(&self, config: &EngineConfig) -> Result<Box<dyn RawConnection>> {
        self(config)
    }
}
