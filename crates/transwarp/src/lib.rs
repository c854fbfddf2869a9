//! Transwarp: lazily opened, scope-managed database connections.
//!
//! Transwarp keeps one database connection per execution context and ties
//! its lifetime to lexical scopes:
//!
//! - an [`Engine`] opens raw driver connections (one process-wide engine can
//!   be installed with [`create_engine`]);
//! - a [`DbContext`] holds at most one [`LazyConnection`], opened only when
//!   the first statement runs;
//! - a [`ConnectionScope`] guarantees a connection and closes it when the
//!   scope that created it ends;
//! - a [`TransactionScope`] adds flat nested transactions: only the outermost
//!   scope commits or rolls back, exactly once.
//!
//! # Quick Start
//!
//! ```ignore
//! use transwarp::prelude::*;
//! use transwarp_sqlite::SqliteConnector;
//!
//! fn main() -> Result<()> {
//!     create_engine(EngineConfig::new().driver("sqlite").database("app.db"), SqliteConnector)?;
//!
//!     let mut ctx = DbContext::from_global()?;
//!     ctx.update("CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//!
//!     ctx.with_transaction(|ctx| {
//!         ctx.update("INSERT INTO users (name) VALUES (?)", &["Ada".into()])?;
//!         // Nested: joins the outer transaction, no commit here.
//!         ctx.with_transaction(|ctx| ctx.update("INSERT INTO users (name) VALUES (?)", &["Grace".into()]))
//!     })?;
//!
//!     let row = ctx.select_one("SELECT COUNT(*) FROM users", &[])?;
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! A `DbContext` is `Send` but is only ever used through `&mut`, so each
//! thread or task must own its own context. The engine is shared and cheap
//! to clone.

pub mod context;
pub mod engine;
pub mod scope;
pub mod sql;

pub use context::{DbContext, LazyConnection};
pub use engine::{Engine, create_engine, global_engine, has_engine, init_engine};
pub use scope::{ConnectionScope, ScopeState, TransactionScope, with_connection, with_transaction};

pub use transwarp_core::{
    ColumnInfo, ConfigError, ConnectionError, ConnectionErrorKind, Connector, Cursor,
    EngineConfig, EngineError, EngineErrorKind, Error, QueryError, QueryErrorKind, RawConnection,
    Result, Row, TransactionError, TransactionErrorKind, Value,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        ConnectionScope, Connector, Cursor, DbContext, Engine, EngineConfig, Error,
        RawConnection, Result, Row, TransactionScope, Value, create_engine, global_engine,
        with_connection, with_transaction,
    };
}
