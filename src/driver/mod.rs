//! Native driver contract.
//!
//! A session never talks to a database directly. It drives an implementation
//! of these two traits, which mirror a handle-based C client library: a
//! factory that opens connections, and a connection that prepares, binds,
//! executes, fetches and frees statements by handle.
//!
//! Native calls only signal *that* they failed. The detail is read back with
//! `last_error()` immediately after the failing call, so an implementation
//! must reset its error slot at the start of every call.

use serde::Serialize;
use std::fmt;

use crate::config::ConnectOptions;
use crate::types::{Row, Value};

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Failure signal returned by native calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverFailure;

/// Result of a native call.
pub type NativeResult<T> = std::result::Result<T, DriverFailure>;

/// Opaque statement handle issued by [`NativeConnection::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(pub u32);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

/// Error detail reported by the native driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeError {
    /// Driver error code.
    pub code: i32,
    /// Driver error message.
    pub message: String,
    /// Character offset into the SQL text, when the driver reports one.
    pub offset: Option<u32>,
    /// SQL text the error refers to.
    #[serde(rename = "sqltext")]
    pub sql_text: Option<String>,
}

impl NativeError {
    /// Create an error with code and message only.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            offset: None,
            sql_text: None,
        }
    }

    /// Attach the offending SQL text.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql_text = Some(sql.into());
        self
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Opens native connections.
pub trait Driver {
    /// Connection type produced by this driver.
    type Connection: NativeConnection;

    /// Establish a connection.
    fn connect(&mut self, options: &ConnectOptions) -> NativeResult<Self::Connection>;

    /// Detail of the last failed `connect`, if any.
    fn last_error(&self) -> Option<NativeError>;
}

/// One live native connection.
///
/// Statement handles are only valid on the connection that issued them and
/// only until [`free_statement`](NativeConnection::free_statement).
pub trait NativeConnection {
    /// Close the connection. Outstanding uncommitted work is discarded.
    fn close(&mut self) -> NativeResult<()>;

    /// Prepare a statement.
    fn prepare(&mut self, sql: &str) -> NativeResult<StatementId>;

    /// Bind a value to a named placeholder.
    fn bind_by_name(&mut self, stmt: StatementId, name: &str, value: &Value) -> NativeResult<()>;

    /// Execute a prepared statement.
    fn execute(&mut self, stmt: StatementId) -> NativeResult<()>;

    /// Fetch every remaining row.
    fn fetch_all(&mut self, stmt: StatementId) -> NativeResult<Vec<Row>>;

    /// Fetch the next row; `None` when the result set is exhausted.
    fn fetch_row(&mut self, stmt: StatementId) -> NativeResult<Option<Row>>;

    /// Rows affected by DML, or rows fetched so far for a query.
    fn num_rows(&mut self, stmt: StatementId) -> NativeResult<u64>;

    /// Release a statement handle.
    fn free_statement(&mut self, stmt: StatementId) -> NativeResult<()>;

    /// Commit the outstanding transaction.
    fn commit(&mut self) -> NativeResult<()>;

    /// Detail of the last failed call on this connection, if any.
    fn last_error(&self) -> Option<NativeError>;
}
