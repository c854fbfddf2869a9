//! Core types and traits for transwarp.
//!
//! This crate provides the pieces shared by the lifecycle layer and the
//! drivers:
//!
//! - `Error` and `Result` for every fallible operation
//! - `Value` and `Row` for statement parameters and results
//! - `Cursor`, `RawConnection` and `Connector`, the opaque driver surface
//! - `EngineConfig` for connection parameters

pub mod config;
pub mod connection;
pub mod error;
pub mod row;
pub mod value;

pub use config::EngineConfig;
pub use connection::{Connector, Cursor, RawConnection};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, EngineError, EngineErrorKind, Error,
    QueryError, QueryErrorKind, Result, TransactionError, TransactionErrorKind,
};
pub use row::{ColumnInfo, Row};
pub use value::Value;
