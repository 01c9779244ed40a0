//! Error types for database sessions.
//!
//! Every failure reported by the native driver is surfaced as one of the
//! context-carrying variants below. The attached [`ErrorContext`] records the
//! inputs of the failed call together with the driver's last reported error.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::driver::NativeError;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Placeholder recorded when the driver signals failure without any detail.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Error type for session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The native driver refused to open a connection.
    #[error("Could not connect. {context}")]
    Connection { context: ErrorContext },

    /// The statement could not be prepared.
    #[error("Could not parse. {context}")]
    Parse { context: ErrorContext },

    /// A named parameter could not be bound.
    #[error("Could not bind parameter by name. {context}")]
    Bind { context: ErrorContext },

    /// The prepared statement failed to execute.
    #[error("Could not execute. {context}")]
    Execute { context: ErrorContext },

    /// Rows could not be fetched from an executed statement.
    #[error("Could not fetch all the rows. {context}")]
    Fetch { context: ErrorContext },

    /// The outstanding transaction could not be committed.
    #[error("Could not commit. {context}")]
    Commit { context: ErrorContext },

    /// Operation attempted on a closed session.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid or incomplete configuration.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Column not found.
    #[error("Column not found: {name}")]
    ColumnNotFound { name: String },

    /// Type conversion error.
    #[error("Type conversion error: {message}")]
    TypeConversion { message: String },
}

/// Discriminant of [`Error`], convenient for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Parse,
    Bind,
    Execute,
    Fetch,
    Commit,
    ConnectionClosed,
    Config,
    ColumnNotFound,
    TypeConversion,
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } => ErrorKind::Connection,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Bind { .. } => ErrorKind::Bind,
            Error::Execute { .. } => ErrorKind::Execute,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Commit { .. } => ErrorKind::Commit,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::Config { .. } => ErrorKind::Config,
            Error::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            Error::TypeConversion { .. } => ErrorKind::TypeConversion,
        }
    }

    /// The structured context, for errors raised from a native call.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Connection { context }
            | Error::Parse { context }
            | Error::Bind { context }
            | Error::Execute { context }
            | Error::Fetch { context }
            | Error::Commit { context } => Some(context),
            _ => None,
        }
    }

    /// Whether this error came out of a query or execute call.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Parse | ErrorKind::Bind | ErrorKind::Execute | ErrorKind::Fetch
        )
    }
}

/// Inputs of a failed call plus the driver's last error.
///
/// Entries keep insertion order. When rendered (through `Display` or serde)
/// the native error is always the final `error` entry, falling back to
/// [`UNKNOWN_ERROR`] when the driver had nothing to report.
///
/// The connect context includes the password exactly as supplied. Callers
/// forwarding these errors to logs or users should strip it first with
/// [`ErrorContext::without`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorContext {
    inputs: serde_json::Map<String, serde_json::Value>,
    native: Option<NativeError>,
}

impl ErrorContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call input.
    pub(crate) fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.inputs.insert(key.to_string(), value);
        self
    }

    /// Record the driver's last error, if it reported one.
    pub(crate) fn with_native_error(mut self, native: Option<NativeError>) -> Self {
        self.native = native;
        self
    }

    /// Look up a recorded input by name.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.inputs.get(key)
    }

    /// Names of the recorded inputs, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// The native error detail, `None` when the driver reported nothing.
    pub fn native_error(&self) -> Option<&NativeError> {
        self.native.as_ref()
    }

    /// Copy of this context with one input removed.
    pub fn without(&self, key: &str) -> Self {
        let inputs = self
            .inputs
            .iter()
            .filter(|(name, _)| name.as_str() != key)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self {
            inputs,
            native: self.native.clone(),
        }
    }
}

impl Serialize for ErrorContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.inputs.len() + 1))?;
        for (key, value) in &self.inputs {
            map.serialize_entry(key, value)?;
        }
        match &self.native {
            Some(native) => map.serialize_entry("error", native)?,
            None => map.serialize_entry("error", UNKNOWN_ERROR)?,
        }
        map.end()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
