//! Recording mock driver shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use transwarp::{
    ConnectionError, ConnectionErrorKind, Cursor, Engine, EngineConfig, Error, QueryError,
    QueryErrorKind, RawConnection, Result, Row, Value,
};

/// Everything the mock driver observed, across all connections it opened.
#[derive(Debug, Default)]
pub struct MockState {
    pub connects: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,
    pub executed: Vec<String>,
    /// Ordered log of driver calls: "connect", "execute", "commit", ...
    pub calls: Vec<&'static str>,
    pub fail_connect: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_close: bool,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// An engine whose connector records into this driver.
    pub fn engine(&self) -> Engine {
        let state = Arc::clone(&self.state);
        Engine::new(
            EngineConfig::new().database("mock"),
            move |_: &EngineConfig| -> Result<Box<dyn RawConnection>> {
                let mut guard = state.lock().expect("mock state poisoned");
                guard.calls.push("connect");
                if guard.fail_connect {
                    return Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Connect,
                        message: "mock connect refused".to_string(),
                        source: None,
                    }));
                }
                guard.connects += 1;
                Ok(Box::new(MockConnection {
                    state: Arc::clone(&state),
                }))
            },
        )
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }
}

impl RawConnection for MockConnection {
    fn cursor(&mut self) -> Result<Box<dyn Cursor + '_>> {
        Ok(Box::new(MockCursor {
            state: Arc::clone(&self.state),
        }))
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("commit");
        if state.fail_commit {
            return Err(Error::Custom("mock commit failure".to_string()));
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("rollback");
        if state.fail_rollback {
            return Err(Error::Custom("mock rollback failure".to_string()));
        }
        state.rollbacks += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("close");
        state.closes += 1;
        if state.fail_close {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Close,
                message: "mock close failure".to_string(),
                source: None,
            }));
        }
        Ok(())
    }
}

struct MockCursor {
    state: Arc<Mutex<MockState>>,
}

impl MockCursor {
    fn record(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.calls.push("execute");
        state.executed.push(sql.to_string());
        if sql.contains("FAIL") {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Syntax,
                sql: Some(sql.to_string()),
                message: "mock syntax error".to_string(),
                source: None,
            }));
        }
        Ok(())
    }
}

impl Cursor for MockCursor {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql)?;
        Ok(vec![Row::new(
            vec!["sql".to_string(), "params".to_string()],
            vec![Value::Text(sql.to_string()), Value::BigInt(params.len() as i64)],
        )])
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.record(sql)?;
        Ok(1)
    }

    fn last_insert_id(&self) -> Option<i64> {
        Some(42)
    }
}

/// Error type used by test bodies that fail for reasons of their own.
#[derive(Debug)]
pub enum AppError {
    Db(Error),
    Invalid(&'static str),
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        AppError::Db(e)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "database: {e}"),
            AppError::Invalid(msg) => write!(f, "invalid: {msg}"),
        }
    }
}
