//! Row type for query results.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::column::{Column, ColumnInfo};
use super::value::Value;
use crate::error::{Error, Result};

/// A row of query results.
///
/// Values are kept in column declaration order. Serializes as a JSON object
/// keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column values.
    values: Vec<Value>,
    /// Shared column information (reference counted).
    column_info: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with values and shared column info.
    pub fn new(values: Vec<Value>, column_info: Arc<ColumnInfo>) -> Self {
        Self {
            values,
            column_info,
        }
    }

    /// Get value by column index (0-based).
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get value by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.column_info
            .find_by_name(name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Like [`Row::get_by_name`], failing with `ColumnNotFound`.
    pub fn try_get(&self, name: &str) -> Result<&Value> {
        self.get_by_name(name).ok_or_else(|| Error::ColumnNotFound {
            name: name.to_string(),
        })
    }

    /// Read a numeric column as i64.
    pub fn get_i64(&self, name: &str) -> Result<i64> {
        let value = self.try_get(name)?;
        value.to_i64().ok_or_else(|| {
            Error::type_conversion(format!(
                "column {} holds {} '{}', not an integer",
                name,
                value.type_name(),
                value
            ))
        })
    }

    /// Read a character column as &str.
    pub fn get_str(&self, name: &str) -> Result<&str> {
        let value = self.try_get(name)?;
        value.as_str().ok_or_else(|| {
            Error::type_conversion(format!(
                "column {} holds {}, not text",
                name,
                value.type_name()
            ))
        })
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get all values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get column information.
    pub fn columns(&self) -> &[Column] {
        &self.column_info.columns
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.column_info.column_names()
    }

    /// Iterate over values.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterate over (column name, value) pairs in declaration order.
    pub fn iter_named(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_info
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter_named() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
