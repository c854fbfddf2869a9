//! Error types for transwarp operations.

use std::fmt;

/// The primary error type for all transwarp operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors raised by a driver (connect, close, disconnect)
    Connection(ConnectionError),
    /// Statement execution errors raised by a driver
    Query(QueryError),
    /// Transaction lifecycle errors (commit, rollback, missing connection)
    Transaction(TransactionError),
    /// Engine singleton errors
    Engine(EngineError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
    /// Closing the connection failed
    Close,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Database busy or locked
    Busy,
    /// Permission denied
    Permission,
    /// Parameter binding failed
    Bind,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
    pub source: Option<Box<Error>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Commit/rollback requested before any connection was established
    NoActiveConnection,
    /// The physical commit failed (a recovery rollback was attempted)
    CommitFailed,
    /// The physical rollback failed
    RollbackFailed,
}

#[derive(Debug)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The process-wide engine was initialized twice
    AlreadyInitialized,
    /// The process-wide engine has not been initialized
    NotInitialized,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransactionError {
    pub fn no_active_connection() -> Self {
        Self {
            kind: TransactionErrorKind::NoActiveConnection,
            message: "no active connection: call cursor() before commit or rollback".to_string(),
            source: None,
        }
    }

    pub fn commit_failed(source: Error) -> Self {
        Self {
            kind: TransactionErrorKind::CommitFailed,
            message: format!("commit failed: {source}"),
            source: Some(Box::new(source)),
        }
    }

    pub fn rollback_failed(source: Error) -> Self {
        Self {
            kind: TransactionErrorKind::RollbackFailed,
            message: format!("rollback failed: {source}"),
            source: Some(Box::new(source)),
        }
    }
}

impl EngineError {
    pub fn already_initialized() -> Self {
        Self {
            kind: EngineErrorKind::AlreadyInitialized,
            message: "engine is already initialized".to_string(),
        }
    }

    pub fn not_initialized() -> Self {
        Self {
            kind: EngineErrorKind::NotInitialized,
            message: "engine is not initialized; call create_engine() at startup".to_string(),
        }
    }
}

impl Error {
    /// Is this a transaction error of the given kind?
    pub fn is_transaction(&self, kind: TransactionErrorKind) -> bool {
        matches!(self, Error::Transaction(t) if t.kind == kind)
    }

    /// Is this an engine error of the given kind?
    pub fn is_engine(&self, kind: EngineErrorKind) -> bool {
        matches!(self, Error::Engine(e) if e.kind == kind)
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect
                    | ConnectionErrorKind::Authentication
                    | ConnectionErrorKind::Disconnected
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Engine(e) => write!(f, "Engine error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Transaction(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sql) = &self.sql {
            write!(f, "{} (in `{}`)", self.message, sql)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::Engine(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for transwarp operations.
pub type Result<T> = std::result::Result<T, Error>;
