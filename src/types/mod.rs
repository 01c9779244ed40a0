//! Value, row, and bind types shared by sessions and drivers.

mod bindings;
mod column;
mod row;
mod value;

pub use bindings::Bindings;
pub use column::{Column, ColumnInfo};
pub use row::Row;
pub use value::{Value, DATE_FORMAT};
