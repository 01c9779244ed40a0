//! Streaming cursor over query results.
//!
//! A [`RowCursor`] is produced by [`Session::yield_all`](crate::Session::yield_all).
//! It is a plain `Iterator` of `Result<Row>`: each step performs one blocking
//! row fetch against the native driver, and the sequence ends when the driver
//! reports no more rows. It cannot be rewound.

use std::iter::FusedIterator;

use crate::driver::NativeConnection;
use crate::error::{Error, ErrorContext, Result};
use crate::session::StatementGuard;
use crate::types::Row;

/// Row-by-row cursor.
///
/// Holds a mutable borrow of the session, ensuring only one active cursor
/// per session at a time.
///
/// # Lifecycle
///
/// 1. Created by `Session::yield_all()` with the statement already executed
/// 2. Iterated via `next()`
/// 3. Statement freed when the rows run out, after a fetch error, on
///    `close()`, or when the cursor is dropped part way through
///
/// # Example
///
/// ```
/// use oracle_session::{ConnectOptions, Session, SqliteDriver};
///
/// fn main() -> oracle_session::Result<()> {
///     let mut session = Session::open(&mut SqliteDriver::new(), &ConnectOptions::new("u", "p"))?;
///
///     let mut cursor = session.yield_all("SELECT 1 AS n UNION ALL SELECT 2", None)?;
///     while let Some(row) = cursor.next() {
///         println!("{:?}", row?);
///     }
///     assert!(cursor.is_closed());
///     Ok(())
/// }
/// ```
pub struct RowCursor<'s, C: NativeConnection> {
    /// Executed statement.
    stmt: StatementGuard<'s, C>,
    /// Statement text, kept for error context.
    sql: String,
    /// Total rows fetched so far.
    rows_fetched: u64,
}

impl<'s, C: NativeConnection> RowCursor<'s, C> {
    pub(crate) fn new(stmt: StatementGuard<'s, C>, sql: &str) -> Self {
        Self {
            stmt,
            sql: sql.to_string(),
            rows_fetched: 0,
        }
    }

    /// Number of rows fetched so far.
    pub fn rowcount(&self) -> u64 {
        self.rows_fetched
    }

    /// Whether the statement has been released.
    pub fn is_closed(&self) -> bool {
        self.stmt.is_released()
    }

    /// Statement text this cursor was opened for.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Stop iterating and release the statement now.
    pub fn close(mut self) {
        self.stmt.release();
    }
}

impl<C: NativeConnection> Iterator for RowCursor<'_, C> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stmt.is_released() {
            return None;
        }

        match self.stmt.conn.fetch_row(self.stmt.id) {
            Ok(Some(row)) => {
                self.rows_fetched += 1;
                log::trace!("row {} fetched", self.rows_fetched);
                Some(Ok(row))
            }
            Ok(None) => {
                log::debug!("cursor exhausted after {} rows", self.rows_fetched);
                self.stmt.release();
                None
            }
            Err(_) => {
                let context = ErrorContext::new()
                    .with("sql", &self.sql)
                    .with_native_error(self.stmt.conn.last_error());
                self.stmt.release();
                Some(Err(Error::Fetch { context }))
            }
        }
    }
}

impl<C: NativeConnection> FusedIterator for RowCursor<'_, C> {}
