//! SQLite-backed native driver.
//!
//! Presents a `rusqlite` connection through the handle-based driver
//! contract: statements live in a per-connection table keyed by
//! [`StatementId`], and every failure parks its detail in a last-error slot.
//!
//! The connection runs with autocommit off for writes. The first statement
//! that writes opens a deferred transaction, which stays open until
//! [`NativeConnection::commit`], so nothing written becomes visible to other
//! connections before then. Reads outside a write transaction take no lasting
//! lock: the engine releases it as soon as the statement is finished.
//!
//! Queries are stepped one row per [`NativeConnection::fetch_row`]; the
//! statement stays positioned inside its result between calls.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::types::{Value as SqlValue, ValueRef};
use self_cell::self_cell;

use super::{
    DriverFailure, Driver, NativeConnection, NativeError, NativeResult, StatementId,
};
use crate::config::ConnectOptions;
use crate::types::{Column, ColumnInfo, Row, Value, DATE_FORMAT};

/// Not all variables bound.
pub const CODE_NOT_ALL_BOUND: i32 = 1008;
/// Logon rejected.
pub const CODE_INVALID_LOGON: i32 = 1017;
/// Unknown character set name, or one the database cannot use.
pub const CODE_INVALID_CHARSET: i32 = 12705;
/// Library misuse, e.g. fetching from a statement that was never executed.
pub const CODE_MISUSE: i32 = 21;
/// Bind name or index out of range.
pub const CODE_RANGE: i32 = 25;

const MEMORY_TARGET: &str = ":memory:";

/// Opens [`SqliteConnection`]s.
#[derive(Debug, Default)]
pub struct SqliteDriver {
    credentials: Option<(String, String)>,
    last_error: Option<NativeError>,
}

impl SqliteDriver {
    /// Driver that accepts any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver that only accepts the given username and password.
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((username.into(), password.into())),
            last_error: None,
        }
    }

    fn try_connect(&self, options: &ConnectOptions) -> Result<SqliteConnection, NativeError> {
        if let Some((username, password)) = &self.credentials {
            if *username != options.username || *password != options.password {
                return Err(NativeError::new(
                    CODE_INVALID_LOGON,
                    "invalid username/password; logon denied",
                ));
            }
        }

        let encoding = encoding_for(options.character_set.as_deref())?;

        let conn = match options.target.as_deref() {
            None | Some(MEMORY_TARGET) => rusqlite::Connection::open_in_memory(),
            Some(path) => rusqlite::Connection::open(path),
        }
        .map_err(|e| native_error(&e, None))?;

        if let Some(encoding) = encoding {
            apply_encoding(&conn, encoding)?;
        }

        Ok(SqliteConnection {
            live: Some(LiveConnection::new(conn, |_| HashMap::new())),
            next_statement: 1,
            last_error: None,
        })
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn connect(&mut self, options: &ConnectOptions) -> NativeResult<SqliteConnection> {
        self.last_error = None;
        log::debug!(
            "sqlite connect: target={}",
            options.target.as_deref().unwrap_or(MEMORY_TARGET)
        );
        self.try_connect(options).map_err(|e| {
            self.last_error = Some(e);
            DriverFailure
        })
    }

    fn last_error(&self) -> Option<NativeError> {
        self.last_error.clone()
    }
}

/// Map an OCI-style character set name to a SQLite text encoding.
///
/// `None` leaves the database's encoding as it is.
fn encoding_for(character_set: Option<&str>) -> Result<Option<&'static str>, NativeError> {
    let Some(name) = character_set else {
        return Ok(None);
    };
    match name.to_ascii_uppercase().as_str() {
        "UTF8" | "AL32UTF8" | "UTF-8" => Ok(Some("UTF-8")),
        "AL16UTF16" | "UTF16" | "UTF-16" => Ok(Some("UTF-16")),
        _ => Err(NativeError::new(
            CODE_INVALID_CHARSET,
            format!("invalid or unknown NLS parameter value specified: {}", name),
        )),
    }
}

/// Request `encoding` and check that it took effect.
///
/// SQLite fixes the encoding when a database is first written, so a file
/// created with another encoding rejects the request.
fn apply_encoding(conn: &rusqlite::Connection, encoding: &str) -> Result<(), NativeError> {
    conn.pragma_update(None, "encoding", encoding)
        .map_err(|e| native_error(&e, None))?;
    let actual: String = conn
        .pragma_query_value(None, "encoding", |row| row.get(0))
        .map_err(|e| native_error(&e, None))?;

    // UTF-16 reads back as UTF-16le or UTF-16be.
    if actual.starts_with(encoding) {
        Ok(())
    } else {
        Err(NativeError::new(
            CODE_INVALID_CHARSET,
            format!(
                "character set {} does not match database encoding {}",
                encoding, actual
            ),
        ))
    }
}

/// Where a statement is in its lifecycle.
enum Progress {
    /// Prepared, not executed.
    Idle,
    /// A query positioned inside its result.
    Rows {
        columns: Arc<ColumnInfo>,
        /// Row read by `execute`, handed out by the first fetch.
        ahead: Option<Row>,
        exhausted: bool,
        fetched: u64,
    },
    /// DML/DDL with its changed-row count.
    Changed(u64),
}

/// A prepared statement and its cursor position.
struct LiveStatement<'conn> {
    stmt: rusqlite::Statement<'conn>,
    sql: String,
    /// One-based parameter indexes bound so far.
    bound: Vec<usize>,
    progress: Progress,
}

type StatementTable<'conn> = HashMap<StatementId, LiveStatement<'conn>>;

// The statements borrow the connection they were prepared on.
self_cell!(
    struct LiveConnection {
        owner: rusqlite::Connection,

        #[covariant]
        dependent: StatementTable,
    }
);

/// A live SQLite connection.
pub struct SqliteConnection {
    live: Option<LiveConnection>,
    next_statement: u32,
    last_error: Option<NativeError>,
}

impl SqliteConnection {
    /// Number of statement handles currently allocated.
    pub fn open_statements(&self) -> usize {
        self.live
            .as_ref()
            .map_or(0, |live| live.borrow_dependent().len())
    }

    fn closed_error() -> NativeError {
        NativeError::new(CODE_MISUSE, "not connected to a database")
    }

    fn live(&mut self) -> Result<&mut LiveConnection, NativeError> {
        self.live.as_mut().ok_or_else(Self::closed_error)
    }

    /// Run `f` on the statement behind `stmt` with its connection.
    fn with_statement<T>(
        &mut self,
        stmt: StatementId,
        f: impl FnOnce(&rusqlite::Connection, &mut LiveStatement<'_>) -> Result<T, NativeError>,
    ) -> Result<T, NativeError> {
        self.live()?.with_dependent_mut(|conn, table| {
            let live = table
                .get_mut(&stmt)
                .ok_or_else(|| unknown_statement(stmt))?;
            f(conn, live)
        })
    }
}

fn unknown_statement(stmt: StatementId) -> NativeError {
    NativeError::new(CODE_MISUSE, format!("invalid statement handle {}", stmt))
}

/// Prefix a bare bind name with `:`.
fn placeholder(name: &str) -> String {
    if name.starts_with([':', '@', '$', '?']) {
        name.to_string()
    } else {
        format!(":{}", name)
    }
}

/// First keyword of `sql`, after whitespace and comments.
fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Whether `sql` is a statement the engine counts changed rows for.
///
/// The engine's change counter is only updated by INSERT, UPDATE and DELETE;
/// anything else would report the count left over from an earlier statement.
fn counts_changes(sql: &str) -> bool {
    let keyword = leading_keyword(sql);
    ["INSERT", "UPDATE", "DELETE", "REPLACE", "WITH"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

fn native_error(err: &rusqlite::Error, sql: Option<&str>) -> NativeError {
    let (code, message) = match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => (e.extended_code, msg.clone()),
        rusqlite::Error::SqliteFailure(e, None) => (e.extended_code, e.to_string()),
        other => (-1, other.to_string()),
    };
    NativeError {
        code,
        message,
        offset: None,
        sql_text: sql.map(str::to_string),
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Number(n) => {
            if let Ok(i) = n.parse::<i64>() {
                SqlValue::Integer(i)
            } else if let Ok(f) = n.parse::<f64>() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.clone())
            }
        }
        Value::Date(dt) => SqlValue::Text(dt.format(DATE_FORMAT).to_string()),
        Value::Raw(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

fn from_sql_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.to_string()),
        ValueRef::Real(f) => Value::Number(f.to_string()),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Raw(bytes.to_vec()),
    }
}

fn read_row(row: &rusqlite::Row<'_>, columns: &Arc<ColumnInfo>) -> rusqlite::Result<Row> {
    let values = (0..columns.len())
        .map(|i| row.get_ref(i).map(from_sql_ref))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Row::new(values, Arc::clone(columns)))
}

/// Step `stmt` to its next row.
///
/// A `Rows` resets its statement when dropped, so it is forgotten after a
/// row is read to keep the statement in place for the next step. It holds
/// only a borrow, so nothing leaks. At the end of the result, or on error,
/// `Rows` has already reset the statement itself.
fn step(
    stmt: &mut rusqlite::Statement<'_>,
    columns: &Arc<ColumnInfo>,
) -> rusqlite::Result<Option<Row>> {
    let mut rows = stmt.raw_query();
    let row = match rows.next()? {
        Some(row) => read_row(row, columns)?,
        None => return Ok(None),
    };
    std::mem::forget(rows);
    Ok(Some(row))
}

impl LiveStatement<'_> {
    /// Return a stepped statement to its start.
    fn rewind(&mut self) {
        if !matches!(self.progress, Progress::Idle) {
            // Dropping a fresh `Rows` resets the statement.
            drop(self.stmt.raw_query());
            self.progress = Progress::Idle;
        }
    }

    fn bind(&mut self, name: &str, value: &Value) -> Result<(), NativeError> {
        self.rewind();
        let index = self
            .stmt
            .parameter_index(&placeholder(name))
            .map_err(|e| native_error(&e, Some(self.sql.as_str())))?
            .ok_or_else(|| {
                NativeError::new(CODE_RANGE, format!("bind variable {} does not exist", name))
                    .with_sql(self.sql.clone())
            })?;

        self.stmt
            .raw_bind_parameter(index, to_sql_value(value))
            .map_err(|e| native_error(&e, Some(self.sql.as_str())))?;
        if !self.bound.contains(&index) {
            self.bound.push(index);
        }
        Ok(())
    }

    fn execute(&mut self, conn: &rusqlite::Connection) -> Result<(), NativeError> {
        let unbound = (1..=self.stmt.parameter_count()).find(|i| !self.bound.contains(i));
        if let Some(index) = unbound {
            let name = self.stmt.parameter_name(index).unwrap_or("?");
            return Err(NativeError::new(
                CODE_NOT_ALL_BOUND,
                format!("not all variables bound: {} has no value", name),
            )
            .with_sql(self.sql.clone()));
        }

        self.rewind();
        if !self.stmt.readonly() && conn.is_autocommit() {
            conn.execute_batch("BEGIN")
                .map_err(|e| native_error(&e, None))?;
        }

        let progress = self.run().map_err(|e| native_error(&e, Some(self.sql.as_str())))?;
        self.progress = progress;
        Ok(())
    }

    /// Execute and, for a query, read the first row.
    fn run(&mut self) -> rusqlite::Result<Progress> {
        let width = self.stmt.column_count();
        if width == 0 {
            let counted = !self.stmt.readonly() && counts_changes(&self.sql);
            let changed = self.stmt.raw_execute()?;
            return Ok(Progress::Changed(if counted { changed as u64 } else { 0 }));
        }

        let columns: Arc<ColumnInfo> = Arc::new(
            self.stmt
                .columns()
                .iter()
                .map(|c| match c.decl_type() {
                    Some(decl) => Column::new(c.name()).with_declared_type(decl),
                    None => Column::new(c.name()),
                })
                .collect(),
        );

        let ahead = step(&mut self.stmt, &columns)?;
        Ok(Progress::Rows {
            exhausted: ahead.is_none(),
            ahead,
            columns,
            fetched: 0,
        })
    }

    fn fetch(&mut self) -> Result<Option<Row>, NativeError> {
        match &mut self.progress {
            Progress::Rows {
                columns,
                ahead,
                exhausted,
                fetched,
            } => {
                let row = match ahead.take() {
                    Some(row) => Some(row),
                    None if *exhausted => None,
                    None => match step(&mut self.stmt, columns) {
                        Ok(row) => row,
                        Err(e) => {
                            *exhausted = true;
                            return Err(native_error(&e, Some(self.sql.as_str())));
                        }
                    },
                };
                match row {
                    Some(_) => *fetched += 1,
                    None => *exhausted = true,
                }
                Ok(row)
            }
            Progress::Changed(_) => Err(NativeError::new(
                CODE_MISUSE,
                "statement does not return rows",
            )
            .with_sql(self.sql.clone())),
            Progress::Idle => Err(NativeError::new(CODE_MISUSE, "statement has not been executed")
                .with_sql(self.sql.clone())),
        }
    }

    fn num_rows(&self) -> u64 {
        match &self.progress {
            Progress::Changed(n) => *n,
            Progress::Rows { fetched, .. } => *fetched,
            Progress::Idle => 0,
        }
    }
}

impl SqliteConnection {
    fn try_prepare(&mut self, sql: &str) -> Result<StatementId, NativeError> {
        let id = StatementId(self.next_statement);
        self.live()?.with_dependent_mut(|conn, table| {
            let stmt = conn.prepare(sql).map_err(|e| native_error(&e, Some(sql)))?;
            table.insert(
                id,
                LiveStatement {
                    stmt,
                    sql: sql.to_string(),
                    bound: Vec::new(),
                    progress: Progress::Idle,
                },
            );
            Ok::<_, NativeError>(())
        })?;
        self.next_statement = self.next_statement.wrapping_add(1);
        Ok(id)
    }

    fn try_fetch_all(&mut self, stmt: StatementId) -> Result<Vec<Row>, NativeError> {
        self.with_statement(stmt, |_, live| {
            let mut rows = Vec::new();
            while let Some(row) = live.fetch()? {
                rows.push(row);
            }
            Ok(rows)
        })
    }

    fn try_free(&mut self, stmt: StatementId) -> Result<(), NativeError> {
        self.live()?
            .with_dependent_mut(|_, table| table.remove(&stmt).map(|_| ()))
            .ok_or_else(|| unknown_statement(stmt))
    }

    fn try_commit(&self) -> Result<(), NativeError> {
        let conn = self
            .live
            .as_ref()
            .ok_or_else(Self::closed_error)?
            .borrow_owner();
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch("COMMIT")
            .map_err(|e| native_error(&e, None))
    }

    fn try_close(&mut self) -> Result<(), NativeError> {
        let live = self.live.take().ok_or_else(Self::closed_error)?;
        // Statements are finalized before the connection is handed back.
        live.into_owner()
            .close()
            .map_err(|(_conn, e)| native_error(&e, None))
    }

    /// Reset the last-error slot, then record the outcome of a call.
    fn settle<T>(&mut self, result: Result<T, NativeError>) -> NativeResult<T> {
        self.last_error = None;
        result.map_err(|e| {
            self.last_error = Some(e);
            DriverFailure
        })
    }
}

impl NativeConnection for SqliteConnection {
    fn close(&mut self) -> NativeResult<()> {
        let result = self.try_close();
        self.settle(result)
    }

    fn prepare(&mut self, sql: &str) -> NativeResult<StatementId> {
        let result = self.try_prepare(sql);
        self.settle(result)
    }

    fn bind_by_name(&mut self, stmt: StatementId, name: &str, value: &Value) -> NativeResult<()> {
        let result = self.with_statement(stmt, |_, live| live.bind(name, value));
        self.settle(result)
    }

    fn execute(&mut self, stmt: StatementId) -> NativeResult<()> {
        let result = self.with_statement(stmt, |conn, live| live.execute(conn));
        self.settle(result)
    }

    fn fetch_all(&mut self, stmt: StatementId) -> NativeResult<Vec<Row>> {
        let result = self.try_fetch_all(stmt);
        self.settle(result)
    }

    fn fetch_row(&mut self, stmt: StatementId) -> NativeResult<Option<Row>> {
        let result = self.with_statement(stmt, |_, live| live.fetch());
        self.settle(result)
    }

    fn num_rows(&mut self, stmt: StatementId) -> NativeResult<u64> {
        let result = self.with_statement(stmt, |_, live| Ok(live.num_rows()));
        self.settle(result)
    }

    fn free_statement(&mut self, stmt: StatementId) -> NativeResult<()> {
        let result = self.try_free(stmt);
        self.settle(result)
    }

    fn commit(&mut self) -> NativeResult<()> {
        let result = self.try_commit();
        self.settle(result)
    }

    fn last_error(&self) -> Option<NativeError> {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect() -> SqliteConnection {
        SqliteDriver::new()
            .connect(&ConnectOptions::new("u", "p"))
            .unwrap()
    }

    fn run_sql(conn: &mut SqliteConnection, sql: &str) -> u64 {
        let stmt = conn.prepare(sql).unwrap();
        conn.execute(stmt).unwrap();
        let n = conn.num_rows(stmt).unwrap();
        conn.free_statement(stmt).unwrap();
        n
    }

    #[test]
    fn test_credentials_checked() {
        let mut driver = SqliteDriver::with_credentials("scott", "tiger");
        assert!(driver.connect(&ConnectOptions::new("scott", "wrong")).is_err());
        assert_eq!(driver.last_error().unwrap().code, CODE_INVALID_LOGON);

        assert!(driver.connect(&ConnectOptions::new("scott", "tiger")).is_ok());
        assert!(driver.last_error().is_none());
    }

    #[test]
    fn test_unknown_character_set() {
        let mut driver = SqliteDriver::new();
        let options = ConnectOptions::new("u", "p").with_character_set("WE8ISO8859P1");
        assert!(driver.connect(&options).is_err());
        assert_eq!(driver.last_error().unwrap().code, CODE_INVALID_CHARSET);

        let options = ConnectOptions::new("u", "p").with_character_set("al32utf8");
        assert!(driver.connect(&options).is_ok());
    }

    #[test]
    fn test_prepare_failure_sets_last_error() {
        let mut conn = connect();
        assert!(conn.prepare("SELEKT 1").is_err());
        let err = conn.last_error().unwrap();
        assert_eq!(err.sql_text.as_deref(), Some("SELEKT 1"));
        assert!(err.message.contains("syntax error"));
        assert_eq!(conn.open_statements(), 0);

        // The slot is reset by the next call.
        let stmt = conn.prepare("SELECT 1").unwrap();
        assert!(conn.last_error().is_none());
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_bind_names_with_and_without_colon() {
        let mut conn = connect();
        let stmt = conn.prepare("SELECT :a + :b AS total").unwrap();
        conn.bind_by_name(stmt, "a", &Value::from(2)).unwrap();
        conn.bind_by_name(stmt, ":b", &Value::from(3)).unwrap();
        conn.execute(stmt).unwrap();

        let row = conn.fetch_row(stmt).unwrap().unwrap();
        assert_eq!(row.get_i64("total").unwrap(), 5);
        assert!(conn.fetch_row(stmt).unwrap().is_none());
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_bind_unknown_name() {
        let mut conn = connect();
        let stmt = conn.prepare("SELECT :a").unwrap();
        assert!(conn.bind_by_name(stmt, "missing", &Value::Null).is_err());
        assert_eq!(conn.last_error().unwrap().code, CODE_RANGE);
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_num_rows_dml_and_query() {
        let mut conn = connect();
        run_sql(&mut conn, "CREATE TABLE t (id INTEGER, x INTEGER)");
        assert_eq!(run_sql(&mut conn, "INSERT INTO t VALUES (1, 0), (2, 0), (3, 0)"), 3);
        assert_eq!(run_sql(&mut conn, "UPDATE t SET x = 1 WHERE id > 1"), 2);
        assert_eq!(run_sql(&mut conn, "CREATE TABLE u (id INTEGER)"), 0);
        assert_eq!(run_sql(&mut conn, "CREATE INDEX t_x ON t (x)"), 0);

        let stmt = conn.prepare("SELECT id FROM t ORDER BY id").unwrap();
        conn.execute(stmt).unwrap();
        assert_eq!(conn.num_rows(stmt).unwrap(), 0);
        conn.fetch_row(stmt).unwrap();
        assert_eq!(conn.num_rows(stmt).unwrap(), 1);
        assert_eq!(conn.fetch_all(stmt).unwrap().len(), 2);
        assert_eq!(conn.num_rows(stmt).unwrap(), 3);
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_counts_changes_by_leading_keyword() {
        assert!(counts_changes("INSERT INTO t VALUES (1)"));
        assert!(counts_changes("  update t set x = 1"));
        assert!(counts_changes("-- note\n/* block */ DELETE FROM t"));
        assert!(counts_changes("WITH d AS (SELECT 1) DELETE FROM t"));
        assert!(!counts_changes("CREATE TABLE t (id INTEGER)"));
        assert!(!counts_changes("DROP TABLE t"));
        assert!(!counts_changes("/* unterminated"));
        assert_eq!(leading_keyword("\n\t-- c\nSELECT 1"), "SELECT");
    }

    #[test]
    fn test_reads_hold_no_transaction() {
        let mut conn = connect();
        let autocommit =
            |conn: &SqliteConnection| conn.live.as_ref().unwrap().borrow_owner().is_autocommit();

        assert_eq!(run_sql(&mut conn, "SELECT 1"), 0);
        assert!(autocommit(&conn));

        run_sql(&mut conn, "CREATE TABLE t (id INTEGER)");
        assert!(!autocommit(&conn));

        conn.commit().unwrap();
        assert!(autocommit(&conn));

        // Committing with nothing outstanding is a no-op.
        conn.commit().unwrap();
        assert!(autocommit(&conn));
    }

    #[test]
    fn test_rows_are_stepped_on_fetch() {
        let mut conn = connect();
        // The third row overflows; earlier rows are handed out first.
        let stmt = conn
            .prepare(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 5) \
                 SELECT CASE WHEN i < 3 THEN i ELSE abs(i - 3 - 9223372036854775807 - 1) END AS v \
                 FROM n",
            )
            .unwrap();
        conn.execute(stmt).unwrap();

        assert_eq!(conn.fetch_row(stmt).unwrap().unwrap().get_i64("v").unwrap(), 1);
        assert_eq!(conn.fetch_row(stmt).unwrap().unwrap().get_i64("v").unwrap(), 2);
        assert!(conn.fetch_row(stmt).is_err());
        assert!(conn.last_error().unwrap().message.contains("integer overflow"));
        assert_eq!(conn.num_rows(stmt).unwrap(), 2);

        // A failed step ends the result.
        assert!(conn.fetch_row(stmt).unwrap().is_none());
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_rebind_after_execute_restarts() {
        let mut conn = connect();
        let stmt = conn.prepare("SELECT :v AS v UNION ALL SELECT :v + 1").unwrap();
        conn.bind_by_name(stmt, "v", &Value::from(1)).unwrap();
        conn.execute(stmt).unwrap();
        assert_eq!(conn.fetch_row(stmt).unwrap().unwrap().get_i64("v").unwrap(), 1);

        conn.bind_by_name(stmt, "v", &Value::from(10)).unwrap();
        assert!(conn.fetch_row(stmt).is_err());
        conn.execute(stmt).unwrap();
        let rows = conn.fetch_all(stmt).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_i64("v").unwrap(), 10);
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_execute_with_unbound_variable() {
        let mut conn = connect();
        let stmt = conn.prepare("SELECT :a + :b AS total").unwrap();
        conn.bind_by_name(stmt, "a", &Value::from(1)).unwrap();

        assert!(conn.execute(stmt).is_err());
        let err = conn.last_error().unwrap();
        assert_eq!(err.code, CODE_NOT_ALL_BOUND);
        assert!(err.message.contains(":b"));

        conn.bind_by_name(stmt, "b", &Value::Null).unwrap();
        conn.execute(stmt).unwrap();
        assert_eq!(conn.fetch_row(stmt).unwrap().unwrap().get(0), Some(&Value::Null));
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_charset_must_match_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("utf8.db");
        let target = path.to_string_lossy().to_string();

        let mut conn = SqliteDriver::new()
            .connect(&ConnectOptions::new("u", "p").with_target(target.clone()))
            .unwrap();
        run_sql(&mut conn, "CREATE TABLE t (id INTEGER)");
        conn.commit().unwrap();
        conn.close().unwrap();

        let mut driver = SqliteDriver::new();
        let utf16 = ConnectOptions::new("u", "p")
            .with_target(target.clone())
            .with_character_set("AL16UTF16");
        assert!(driver.connect(&utf16).is_err());
        let err = driver.last_error().unwrap();
        assert_eq!(err.code, CODE_INVALID_CHARSET);
        assert!(err.message.contains("UTF-8"));

        let utf8 = ConnectOptions::new("u", "p")
            .with_target(target)
            .with_character_set("AL32UTF8");
        assert!(driver.connect(&utf8).is_ok());

        let fresh = ConnectOptions::new("u", "p").with_character_set("AL16UTF16");
        assert!(driver.connect(&fresh).is_ok());
    }

    #[test]
    fn test_value_mapping() {
        let mut conn = connect();
        let stmt = conn
            .prepare("SELECT 1 AS i, 2.5 AS r, 'txt' AS s, x'0102' AS b, NULL AS n")
            .unwrap();
        conn.execute(stmt).unwrap();
        let row = conn.fetch_row(stmt).unwrap().unwrap();
        assert_eq!(
            row.values(),
            &[
                Value::Number("1".to_string()),
                Value::Number("2.5".to_string()),
                Value::String("txt".to_string()),
                Value::Raw(vec![1, 2]),
                Value::Null,
            ]
        );
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_fetch_before_execute_fails() {
        let mut conn = connect();
        let stmt = conn.prepare("SELECT 1").unwrap();
        assert!(conn.fetch_row(stmt).is_err());
        assert_eq!(conn.last_error().unwrap().code, CODE_MISUSE);
        conn.free_statement(stmt).unwrap();
    }

    #[test]
    fn test_free_unknown_statement() {
        let mut conn = connect();
        let stmt = conn.prepare("SELECT 1").unwrap();
        conn.free_statement(stmt).unwrap();
        assert!(conn.free_statement(stmt).is_err());
    }

    #[test]
    fn test_close_twice() {
        let mut conn = connect();
        assert!(conn.close().is_ok());
        assert!(conn.close().is_err());
        assert!(conn.prepare("SELECT 1").is_err());
    }
}
