//! High-level Session API.

use crate::config::ConnectOptions;
use crate::cursor::RowCursor;
use crate::driver::{Driver, NativeConnection, StatementId};
use crate::error::{Error, ErrorContext, Result};
use crate::types::{Bindings, Row};

/// A database session owning one native connection.
///
/// The session is open from a successful [`Session::open`] until
/// [`Session::close`] or drop. Every operation on a closed session fails
/// with [`Error::ConnectionClosed`]. Failures inside an operation leave the
/// session open and usable.
///
/// Nothing is committed implicitly: call [`Session::commit`] after
/// [`Session::execute`], or the work is discarded when the session closes.
///
/// # Example
///
/// ```
/// use oracle_session::{Bindings, ConnectOptions, Session, SqliteDriver};
///
/// fn main() -> oracle_session::Result<()> {
///     let mut driver = SqliteDriver::new();
///     let mut session = Session::open(&mut driver, &ConnectOptions::new("scott", "tiger"))?;
///
///     session.execute("CREATE TABLE t (id INTEGER, x INTEGER)", None)?;
///     session.execute("INSERT INTO t VALUES (5, 0)", None)?;
///
///     let bindings = Bindings::new().bind("id", 5);
///     let affected = session.execute("UPDATE t SET x = 1 WHERE id = :id", Some(&bindings))?;
///     assert_eq!(affected, 1);
///     session.commit()?;
///
///     for row in session.all("SELECT id, x FROM t", None)? {
///         println!("{:?}", row);
///     }
///     Ok(())
/// }
/// ```
pub struct Session<C: NativeConnection> {
    conn: Option<C>,
}

impl<C: NativeConnection> Session<C> {
    /// Open a session through `driver`.
    ///
    /// On failure the error context carries `username`, `password`,
    /// `connectionString`, `characterSet` and the driver's error detail.
    pub fn open<D>(driver: &mut D, options: &ConnectOptions) -> Result<Self>
    where
        D: Driver<Connection = C>,
    {
        log::debug!(
            "opening session for {} (target={:?}, charset={:?})",
            options.username,
            options.target,
            options.character_set
        );

        match driver.connect(options) {
            Ok(conn) => Ok(Self { conn: Some(conn) }),
            Err(_) => {
                let context = ErrorContext::new()
                    .with("username", &options.username)
                    .with("password", &options.password)
                    .with("connectionString", &options.target)
                    .with("characterSet", &options.character_set)
                    .with_native_error(driver.last_error());
                Err(Error::Connection { context })
            }
        }
    }

    /// Release the native connection. Does nothing if already closed.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            log::debug!("closing session");
            if conn.close().is_err() {
                log::warn!("native close failed: {:?}", conn.last_error());
            }
        }
    }

    /// Whether the session still holds a connection.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// The native connection, for driver-specific calls.
    pub fn connection(&self) -> Option<&C> {
        self.conn.as_ref()
    }

    /// Run a query and fetch every row.
    pub fn all(&mut self, sql: &str, bindings: Option<&Bindings>) -> Result<Vec<Row>> {
        let mut stmt = self.prepared(sql, bindings)?;

        let rows = match stmt.conn.fetch_all(stmt.id) {
            Ok(rows) => rows,
            Err(_) => {
                let context = ErrorContext::new()
                    .with("sql", sql)
                    .with_native_error(stmt.conn.last_error());
                stmt.release();
                return Err(Error::Fetch { context });
            }
        };

        stmt.release();
        log::debug!("fetched {} rows", rows.len());
        Ok(rows)
    }

    /// Run a query and return a cursor that fetches rows on demand.
    ///
    /// Prepare, bind and execute happen here; each call to the cursor's
    /// `next()` performs one blocking row fetch. The cursor borrows the
    /// session, so only one can be active at a time.
    pub fn yield_all(&mut self, sql: &str, bindings: Option<&Bindings>) -> Result<RowCursor<'_, C>> {
        let stmt = self.prepared(sql, bindings)?;
        Ok(RowCursor::new(stmt, sql))
    }

    /// Run an INSERT, UPDATE, DELETE or DDL statement.
    ///
    /// Returns the number of affected rows.
    pub fn execute(&mut self, sql: &str, bindings: Option<&Bindings>) -> Result<u64> {
        let mut stmt = self.prepared(sql, bindings)?;

        let affected = match stmt.conn.num_rows(stmt.id) {
            Ok(n) => n,
            Err(_) => {
                let context = ErrorContext::new()
                    .with("sql", sql)
                    .with("bindings", bindings)
                    .with_native_error(stmt.conn.last_error());
                stmt.release();
                return Err(Error::Execute { context });
            }
        };

        stmt.release();
        log::debug!("{} rows affected", affected);
        Ok(affected)
    }

    /// Commit the outstanding transaction.
    pub fn commit(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
        log::debug!("commit");
        conn.commit().map_err(|_| Error::Commit {
            context: ErrorContext::new().with_native_error(conn.last_error()),
        })
    }

    /// Prepare, bind and execute `sql`, returning the live statement.
    fn prepared(&mut self, sql: &str, bindings: Option<&Bindings>) -> Result<StatementGuard<'_, C>> {
        let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut stmt = StatementGuard::prepare(conn, sql)?;
        if let Some(bindings) = bindings {
            stmt.bind(bindings)?;
        }
        stmt.execute(sql, bindings)?;
        Ok(stmt)
    }
}

impl<C: NativeConnection> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A prepared statement that is freed exactly once.
///
/// Error paths call [`StatementGuard::release`] after reading the driver's
/// last error and before returning; `Drop` covers everything else.
pub(crate) struct StatementGuard<'c, C: NativeConnection> {
    pub(crate) conn: &'c mut C,
    pub(crate) id: StatementId,
    released: bool,
}

impl<'c, C: NativeConnection> StatementGuard<'c, C> {
    fn prepare(conn: &'c mut C, sql: &str) -> Result<Self> {
        log::debug!("prepare: {}", sql);
        match conn.prepare(sql) {
            Ok(id) => Ok(Self {
                conn,
                id,
                released: false,
            }),
            Err(_) => Err(Error::Parse {
                context: ErrorContext::new()
                    .with("sql", sql)
                    .with_native_error(conn.last_error()),
            }),
        }
    }

    /// Bind each entry in order, abandoning the statement on the first failure.
    fn bind(&mut self, bindings: &Bindings) -> Result<()> {
        for (key, value) in bindings.iter() {
            if self.conn.bind_by_name(self.id, key, value).is_err() {
                let context = ErrorContext::new()
                    .with("key", key)
                    .with("value", value)
                    .with_native_error(self.conn.last_error());
                self.release();
                return Err(Error::Bind { context });
            }
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, bindings: Option<&Bindings>) -> Result<()> {
        if self.conn.execute(self.id).is_err() {
            let context = ErrorContext::new()
                .with("sql", sql)
                .with("bindings", bindings)
                .with_native_error(self.conn.last_error());
            self.release();
            return Err(Error::Execute { context });
        }
        Ok(())
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    /// Free the native statement. Idempotent.
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.conn.free_statement(self.id).is_err() {
            log::warn!(
                "failed to free {}: {:?}",
                self.id,
                self.conn.last_error()
            );
        }
    }
}

impl<C: NativeConnection> Drop for StatementGuard<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}
