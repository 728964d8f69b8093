//! Result rows.

use super::error::DriverError;
use super::value::{FromValue, Value};

/// One row returned by a reader, addressable by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter, mainly for drivers and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing any existing value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Raw value of a column.
    pub fn get(&self, column: &str) -> Result<&Value, DriverError> {
        self.try_get(column)
            .ok_or_else(|| DriverError::MissingColumn(column.to_string()))
    }

    /// Raw value of a column, if present.
    pub fn try_get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Typed getter.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T, DriverError> {
        T::from_value(self.get(column)?).map_err(|source| DriverError::Conversion {
            column: column.to_string(),
            source,
        })
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, DriverError> {
        self.get_as(column)
    }

    pub fn get_i32(&self, column: &str) -> Result<i32, DriverError> {
        self.get_as(column)
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, DriverError> {
        self.get_as(column)
    }

    pub fn get_string(&self, column: &str) -> Result<String, DriverError> {
        self.get_as(column)
    }

    /// Typed getter mapping `NULL` to `None`.
    pub fn get_opt<T: FromValue>(&self, column: &str) -> Result<Option<T>, DriverError> {
        self.get_as(column)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
