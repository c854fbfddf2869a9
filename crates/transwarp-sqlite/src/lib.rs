//! SQLite driver for transwarp.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the opaque driver surface from `transwarp-core`
//! ([`RawConnection`](transwarp_core::RawConnection),
//! [`Cursor`](transwarp_core::Cursor) and
//! [`Connector`](transwarp_core::Connector)) on top of libsqlite3.
//!
//! # Example
//!
//! ```rust,ignore
//! use transwarp_core::EngineConfig;
//! use transwarp_sqlite::SqliteConnector;
//!
//! let engine = transwarp::create_engine(
//!     EngineConfig::new().driver("sqlite").database("app.db"),
//!     SqliteConnector,
//! )?;
//! ```
//!
//! # Type Mapping
//!
//! | transwarp `Value` | SQLite storage class |
//! |-------------------|----------------------|
//! | `Null` | NULL |
//! | `Bool` | INTEGER (0/1) |
//! | `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |

pub mod connection;
pub mod types;

pub use connection::{SqliteConfig, SqliteConnection, SqliteConnector, SqliteCursor};

/// The linked SQLite library version.
pub fn sqlite_version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string
    unsafe { std::ffi::CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_str()
        .unwrap_or("unknown")
}
