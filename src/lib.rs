//! Database sessions over a native SQL client library
//!
//! A thin, blocking adapter around a handle-based SQL driver. A [`Session`]
//! owns one connection and offers batch queries ([`Session::all`]),
//! streaming queries ([`Session::yield_all`]), parameterized DML
//! ([`Session::execute`]) and explicit [`Session::commit`]. Every native
//! failure is returned as a typed [`Error`] carrying an [`ErrorContext`]
//! with the call's inputs and the driver's last error.
//!
//! The driver is anything implementing [`Driver`] / [`NativeConnection`].
//! A SQLite implementation ships behind the default `sqlite` feature.
//!
//! # Example
//!
//! ```
//! use oracle_session::{Bindings, ConnectOptions, Session, SqliteDriver};
//!
//! fn main() -> oracle_session::Result<()> {
//!     let mut driver = SqliteDriver::new();
//!     let mut session = Session::open(&mut driver, &ConnectOptions::new("scott", "tiger"))?;
//!
//!     let rows = session.all(
//!         "SELECT :greeting AS message",
//!         Some(&Bindings::new().bind("greeting", "hello")),
//!     )?;
//!     assert_eq!(rows[0].get_str("message")?, "hello");
//!
//!     session.close();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod session;
pub mod types;

// Re-export main types
pub use config::ConnectOptions;
pub use cursor::RowCursor;
pub use driver::{Driver, DriverFailure, NativeConnection, NativeError, NativeResult, StatementId};
pub use error::{Error, ErrorContext, ErrorKind, Result, UNKNOWN_ERROR};
pub use session::Session;
pub use types::{Bindings, Column, ColumnInfo, Row, Value};

#[cfg(feature = "sqlite")]
pub use driver::sqlite::{SqliteConnection, SqliteDriver};

/// Session over the bundled SQLite driver.
#[cfg(feature = "sqlite")]
pub type SqliteSession = Session<driver::sqlite::SqliteConnection>;
