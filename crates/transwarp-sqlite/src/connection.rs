//! SQLite connection implementation.
//!
//! [`SqliteConnection`] wraps a raw `sqlite3*` handle and implements
//! [`RawConnection`] with DB-API transaction semantics: the first
//! data-modifying statement after a commit or rollback opens a transaction,
//! which stays open until [`commit`](RawConnection::commit) or
//! [`rollback`](RawConnection::rollback). Reads and DDL outside a
//! transaction run in autocommit mode.

use std::ffi::{CStr, CString, c_int};
use std::ptr;

use libsqlite3_sys as ffi;

// The bundled SQLite library exports `sqlite3_close_v2`, but the pregenerated
// libsqlite3-sys bindings in this build do not declare it.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}
use transwarp_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use transwarp_core::{
    ColumnInfo, Connector, Cursor, EngineConfig, Error, RawConnection, Result, Row, Value,
};

use crate::types;

/// Default busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;

/// Configuration for opening a SQLite connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`
    pub path: String,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SqliteConfig {
    /// Configuration for a file-backed database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Configuration for a private in-memory database.
    pub fn memory() -> Self {
        Self::file(":memory:")
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Derive SQLite settings from engine parameters.
    ///
    /// `database` is the path (empty means `:memory:`); the `busy_timeout`
    /// option overrides the default busy timeout.
    pub fn from_engine_config(config: &EngineConfig) -> Result<Self> {
        let path = if config.database.is_empty() {
            ":memory:".to_string()
        } else {
            config.database.clone()
        };

        let busy_timeout_ms = match config.get_option("busy_timeout") {
            Some(raw) => raw.parse().map_err(|e| {
                Error::Config(transwarp_core::ConfigError {
                    message: format!("invalid busy_timeout option: {raw}"),
                    source: Some(Box::new(e)),
                })
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        Ok(Self {
            path,
            busy_timeout_ms,
        })
    }
}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    db: *mut ffi::sqlite3,
    path: String,
}

// SAFETY: the handle is opened with SQLITE_OPEN_FULLMUTEX and only used
// through `&mut self`, so moving it to another thread is sound.
unsafe impl Send for SqliteConnection {}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("open", &!self.db.is_null())
            .finish()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags =
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_FULLMUTEX;

        // SAFETY: valid C string and out pointer; the return code is checked
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &raw mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: db is a valid (failed) handle that must still be closed
                unsafe {
                    let msg = errmsg(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database '{}': {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite connection");

        Ok(Self {
            db,
            path: config.path.clone(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether a transaction is currently open on this connection.
    pub fn in_transaction(&self) -> bool {
        // SAFETY: db is valid while self is alive
        !self.db.is_null() && unsafe { ffi::sqlite3_get_autocommit(self.db) } == 0
    }

    /// Execute SQL directly without parameters or implicit BEGIN.
    pub fn execute_raw(&mut self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut err_ptr: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: db and the C string are valid; errmsg is freed below
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &raw mut err_ptr)
        };

        if rc != ffi::SQLITE_OK {
            let message = if err_ptr.is_null() {
                error_string(rc)
            } else {
                // SAFETY: err_ptr was allocated by SQLite
                unsafe {
                    let msg = CStr::from_ptr(err_ptr).to_string_lossy().into_owned();
                    ffi::sqlite3_free(err_ptr.cast());
                    msg
                }
            };
            return Err(Error::Query(QueryError {
                kind: error_code_to_kind(rc),
                sql: Some(sql.to_string()),
                message,
                source: None,
            }));
        }
        Ok(())
    }

    fn begin_if_needed(&mut self, sql: &str) -> Result<()> {
        if is_data_modifying(sql) && !self.in_transaction() {
            tracing::trace!(path = %self.path, "Implicit BEGIN");
            self.execute_raw("BEGIN")?;
        }
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid; close_v2 defers the close until statements finish
            unsafe {
                sqlite3_close_v2(self.db);
            }
            self.db = ptr::null_mut();
        }
    }
}

impl RawConnection for SqliteConnection {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        Ok(Box::new(SqliteCursor {
            conn: self,
            last_insert_id: None,
        }))
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.execute_raw("COMMIT")?;
            tracing::trace!(path = %self.path, "COMMIT");
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction() {
            self.execute_raw("ROLLBACK")?;
            tracing::trace!(path = %self.path, "ROLLBACK");
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        let db = std::mem::replace(&mut self.db, ptr::null_mut());
        if db.is_null() {
            return Ok(());
        }

        // SAFETY: db is valid and no statements outlive the cursors that own them
        let rc = unsafe { ffi::sqlite3_close(db) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is still open after a failed close; hand it to close_v2
            let message = unsafe {
                let msg = errmsg(db);
                sqlite3_close_v2(db);
                msg
            };
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Close,
                message: format!("Failed to close database '{}': {}", self.path, message),
                source: None,
            }));
        }

        tracing::debug!(path = %self.path, "Closed SQLite connection");
        Ok(())
    }
}

/// A cursor borrowing a [`SqliteConnection`].
pub struct SqliteCursor<'conn> {
    conn: &'conn mut SqliteConnection,
    last_insert_id: Option<i64>,
}

impl Cursor for SqliteCursor<'_> {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.conn.begin_if_needed(sql)?;
        let db = self.conn.db;
        let Some(stmt) = Statement::prepare(db, sql)? else {
            return Ok(Vec::new());
        };
        stmt.bind_all(db, sql, params)?;

        let columns = std::sync::Arc::new(ColumnInfo::new(stmt.column_names()));
        let mut rows = Vec::new();
        while stmt.step(db, sql)? {
            rows.push(Row::with_columns(
                std::sync::Arc::clone(&columns),
                stmt.read_row(columns.len()),
            ));
        }
        Ok(rows)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.conn.begin_if_needed(sql)?;
        let db = self.conn.db;
        let Some(stmt) = Statement::prepare(db, sql)? else {
            return Ok(0);
        };
        stmt.bind_all(db, sql, params)?;
        while stmt.step(db, sql)? {}

        // SAFETY: db is valid
        let (changes, rowid) =
            unsafe { (ffi::sqlite3_changes(db), ffi::sqlite3_last_insert_rowid(db)) };
        if starts_with_keyword(sql, "INSERT") || starts_with_keyword(sql, "REPLACE") {
            self.last_insert_id = Some(rowid);
        }
        Ok(changes as u64)
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}

/// Opens [`SqliteConnection`]s for an engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, config: &EngineConfig) -> Result<Box<dyn RawConnection>> {
        let sqlite = SqliteConfig::from_engine_config(config)?;
        Ok(Box::new(SqliteConnection::open(&sqlite)?))
    }

    fn driver_name(&self) -> &str {
        "sqlite"
    }
}

/// A prepared statement, finalized on drop.
struct Statement {
    stmt: *mut ffi::sqlite3_stmt,
}

impl Statement {
    /// Prepare `sql`; `None` when it contains no statement (blank or comment only).
    ///
    /// Only a single statement is accepted. Anything but whitespace, `;` or
    /// comments after the first statement is a syntax error rather than
    /// being silently skipped.
    fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<Option<Self>> {
        let c_sql = CString::new(sql).map_err(|_| nul_in_sql(sql))?;
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const std::ffi::c_char = ptr::null();

        // SAFETY: all pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &raw mut stmt,
                &raw mut tail,
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(driver_error(db, sql, None));
        }
        let statement = if stmt.is_null() {
            None
        } else {
            Some(Self { stmt })
        };

        let consumed = if tail.is_null() {
            sql.len()
        } else {
            // SAFETY: SQLite sets the tail inside the buffer it was given
            let offset = unsafe { tail.offset_from(c_sql.as_ptr()) };
            usize::try_from(offset).unwrap_or(sql.len())
        };
        let rest = sql.get(consumed..).unwrap_or_default();
        if !is_blank_sql(rest) {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(sql.to_string()),
                message: format!(
                    "only one statement can be run at a time; unexpected trailing SQL: {}",
                    rest.trim()
                ),
                source: None,
            }));
        }

        Ok(statement)
    }

    fn bind_all(&self, db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<()> {
        for (i, param) in params.iter().enumerate() {
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.stmt, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                return Err(driver_error(db, sql, Some(i + 1)));
            }
        }
        Ok(())
    }

    /// Advance the statement; `true` when a row is available.
    fn step(&self, db: *mut ffi::sqlite3, sql: &str) -> Result<bool> {
        // SAFETY: stmt is valid
        match unsafe { ffi::sqlite3_step(self.stmt) } {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            _ => Err(driver_error(db, sql, None)),
        }
    }

    fn column_names(&self) -> Vec<String> {
        // SAFETY: stmt is valid
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        (0..count)
            .map(|i| {
                // SAFETY: i is in range
                unsafe { types::column_name(self.stmt, i) }.unwrap_or_else(|| format!("col{i}"))
            })
            .collect()
    }

    fn read_row(&self, count: usize) -> Vec<Value> {
        (0..count as c_int)
            // SAFETY: the last step returned SQLITE_ROW and i is in range
            .map(|i| unsafe { types::read_column(self.stmt, i) })
            .collect()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: stmt is valid and finalized exactly once
        unsafe {
            ffi::sqlite3_finalize(self.stmt);
        }
    }
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    let trimmed = sql.trim_start();
    trimmed.len() >= keyword.len()
        && trimmed.is_char_boundary(keyword.len())
        && trimmed[..keyword.len()].eq_ignore_ascii_case(keyword)
}

fn is_data_modifying(sql: &str) -> bool {
    ["INSERT", "UPDATE", "DELETE", "REPLACE"]
        .iter()
        .any(|kw| starts_with_keyword(sql, kw))
}

/// True when `sql` holds nothing but whitespace, semicolons and comments.
fn is_blank_sql(mut sql: &str) -> bool {
    loop {
        sql = sql.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
        if let Some(after) = sql.strip_prefix("--") {
            sql = after.split_once('\n').map_or("", |(_, rest)| rest);
        } else if let Some(after) = sql.strip_prefix("/*") {
            sql = after.split_once("*/").map_or("", |(_, rest)| rest);
        } else {
            return sql.is_empty();
        }
    }
}

fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: db is a valid handle; errmsg returns a NUL-terminated string
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn error_string(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(code)) }
        .to_string_lossy()
        .into_owned()
}

fn driver_error(db: *mut ffi::sqlite3, sql: &str, param_index: Option<usize>) -> Error {
    // SAFETY: db is valid
    let code = unsafe { ffi::sqlite3_errcode(db) };
    let msg = errmsg(db);
    let (kind, message) = match param_index {
        Some(i) => (
            QueryErrorKind::Bind,
            format!("Failed to bind parameter {i}: {msg}"),
        ),
        None => (error_code_to_kind(code), msg),
    };
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

fn nul_in_sql(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Box<SqliteConnection> {
        Box::new(SqliteConnection::open_memory().expect("open memory db"))
    }

    #[test]
    fn keyword_detection() {
        assert!(is_data_modifying("  insert into t values (1)"));
        assert!(is_data_modifying("UPDATE t SET a = 1"));
        assert!(!is_data_modifying("SELECT * FROM t"));
        assert!(!is_data_modifying("CREATE TABLE t (a)"));
        assert!(!is_data_modifying("DEL"));
        assert!(starts_with_keyword("replace into t values (1)", "REPLACE"));
    }

    #[test]
    fn config_from_engine_config() {
        let config = SqliteConfig::from_engine_config(&EngineConfig::new()).expect("config");
        assert_eq!(config, SqliteConfig::memory());

        let config = SqliteConfig::from_engine_config(
            &EngineConfig::new()
                .database("/tmp/app.db")
                .option("busy_timeout", "250"),
        )
        .expect("config");
        assert_eq!(config.path, "/tmp/app.db");
        assert_eq!(config.busy_timeout_ms, 250);

        let err = SqliteConfig::from_engine_config(
            &EngineConfig::new().option("busy_timeout", "soon"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn dml_opens_implicit_transaction() {
        let mut conn = memory();
        {
            let mut cursor = conn.cursor().expect("cursor");
            cursor
                .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])
                .expect("create");
        }
        assert!(!conn.in_transaction());

        {
            let mut cursor = conn.cursor().expect("cursor");
            let affected = cursor
                .execute("INSERT INTO users (name) VALUES (?)", &[Value::from("Ada")])
                .expect("insert");
            assert_eq!(affected, 1);
            assert_eq!(cursor.last_insert_id(), Some(1));
        }
        assert!(conn.in_transaction());

        conn.rollback().expect("rollback");
        assert!(!conn.in_transaction());

        let mut cursor = conn.cursor().expect("cursor");
        let rows = cursor.query("SELECT COUNT(*) AS n FROM users", &[]).expect("count");
        assert_eq!(rows[0].get_by_name("n"), Some(&Value::BigInt(0)));
    }

    #[test]
    fn commit_and_rollback_without_transaction_are_noops() {
        let mut conn = memory();
        conn.commit().expect("commit");
        conn.rollback().expect("rollback");
        conn.close().expect("close");
    }

    #[test]
    fn values_round_trip_through_columns() {
        let mut conn = memory();
        let mut cursor = conn.cursor().expect("cursor");
        let rows = cursor
            .query(
                "SELECT ? AS n, ? AS b, ? AS d, ? AS t, ? AS x, ? AS z",
                &[
                    Value::Null,
                    Value::Bool(true),
                    Value::Double(1.5),
                    Value::Text("héllo".into()),
                    Value::Bytes(vec![0, 1, 2]),
                    Value::BigInt(i64::MAX),
                ],
            )
            .expect("select");

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.columns(), ["n", "b", "d", "t", "x", "z"]);
        assert_eq!(row.get(0), Some(&Value::Null));
        assert_eq!(row.get(1), Some(&Value::BigInt(1)));
        assert_eq!(row.get(2), Some(&Value::Double(1.5)));
        assert_eq!(row.get(3), Some(&Value::Text("héllo".into())));
        assert_eq!(row.get(4), Some(&Value::Bytes(vec![0, 1, 2])));
        assert_eq!(row.get(5), Some(&Value::BigInt(i64::MAX)));
    }

    #[test]
    fn errors_carry_sql_and_kind() {
        let mut conn = memory();
        let mut cursor = conn.cursor().expect("cursor");
        let err = cursor.query("SELEC 1", &[]).unwrap_err();
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                ..
            })
        ));

        cursor
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .expect("create");
        cursor
            .execute("INSERT INTO t (id) VALUES (1)", &[])
            .expect("insert");
        let err = cursor
            .execute("INSERT INTO t (id) VALUES (1)", &[])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                ..
            })
        ));
    }

    #[test]
    fn trailing_statements_are_rejected() {
        let mut conn = memory();
        let mut cursor = conn.cursor().expect("cursor");
        cursor
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
            .expect("create");

        let sql = "INSERT INTO t (id) VALUES (1); DELETE FROM t";
        let err = cursor.execute(sql, &[]).unwrap_err();
        assert_eq!(err.sql(), Some(sql));
        assert!(matches!(
            err,
            Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                ..
            })
        ));
        assert!(err.to_string().contains("DELETE FROM t"));

        let rows = cursor
            .query("SELECT COUNT(*) AS n FROM t", &[])
            .expect("count");
        assert_eq!(rows[0].get_by_name("n"), Some(&Value::BigInt(0)));

        assert_eq!(
            cursor
                .execute("INSERT INTO t (id) VALUES (2); -- done\n ; /* trailing */", &[])
                .expect("single statement with trailing comments"),
            1
        );
    }

    #[test]
    fn blank_sql_detection() {
        assert!(is_blank_sql(""));
        assert!(is_blank_sql(" ;\n\t; "));
        assert!(is_blank_sql("-- comment"));
        assert!(is_blank_sql("/* a */ -- b\n;"));
        assert!(is_blank_sql("/* unterminated"));
        assert!(!is_blank_sql("; SELECT 1"));
        assert!(!is_blank_sql("-- c\nDELETE FROM t"));
    }

    #[test]
    fn blank_sql_is_a_noop() {
        let mut conn = memory();
        let mut cursor = conn.cursor().expect("cursor");
        assert_eq!(cursor.execute("   ", &[]).expect("blank"), 0);
        assert!(cursor.query("-- nothing", &[]).expect("comment").is_empty());
    }

    #[test]
    fn connector_reports_driver_name() {
        let connector = SqliteConnector;
        assert_eq!(connector.driver_name(), "sqlite");
        let conn = connector
            .connect(&EngineConfig::new().driver("sqlite"))
            .expect("connect");
        conn.close().expect("close");
    }
}
