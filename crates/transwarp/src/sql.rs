//! Statement helpers that run inside a connection scope.
//!
//! Each helper enters a [`ConnectionScope`](crate::ConnectionScope), runs one
//! statement and exits. Called inside a transaction they share its
//! connection and never commit.

use transwarp_core::{Result, Row, Value};

use crate::context::DbContext;
use crate::scope::with_connection;

impl DbContext {
    /// Run a query and collect every row.
    pub fn select(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::trace!(sql, params = params.len(), "select");
        with_connection(self, |ctx| -> Result<Vec<Row>> { ctx.cursor()?.query(sql, params) })
    }

    /// Run a query and return its first row, if any.
    pub fn select_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.select(sql, params)?.into_iter().next())
    }

    /// Run an INSERT, UPDATE or DELETE and return the affected row count.
    pub fn update(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::trace!(sql, params = params.len(), "update");
        let affected =
            with_connection(self, |ctx| -> Result<u64> { ctx.cursor()?.execute(sql, params) })?;
        tracing::debug!(affected, "Statement executed");
        Ok(affected)
    }

    /// Run an INSERT and return the driver's last inserted id.
    pub fn insert(&mut self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        tracing::trace!(sql, params = params.len(), "insert");
        with_connection(self, |ctx| -> Result<Option<i64>> {
            let mut cursor = ctx.cursor()?;
            cursor.execute(sql, params)?;
            Ok(cursor.last_insert_id())
        })
    }
}
