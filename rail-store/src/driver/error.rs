//! Driver error types.

use super::value::ValueError;

/// Errors raised by a driver while executing a command or reading a row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// The statement references a table the driver does not know
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The driver cannot execute this kind of statement
    #[error("unsupported statement: {0}")]
    Unsupported(String),

    /// A placeholder in the statement has no bound value
    #[error("missing parameter @{0}")]
    MissingParameter(String),

    /// Bound value count differs from the statement's parameter list
    #[error("statement expects {expected} parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    /// Requested column is not part of the row
    #[error("no column named {0}")]
    MissingColumn(String),

    /// Column value could not be converted
    #[error("column {column}: {source}")]
    Conversion {
        column: String,
        #[source]
        source: ValueError,
    },

    /// Column value parsed but failed domain validation
    #[error("column {column}: {message}")]
    InvalidValue { column: String, message: String },

    /// Statement violated a table constraint
    #[error("constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },
}
