//! Validated rail identifiers.
//!
//! Each type checks its format once at construction, so entities holding
//! them never store a malformed code. All of them convert to and from
//! driver [`Value`]s so they can be mapped to text columns directly.

mod headcode;
mod operator;
mod service_uid;
mod station;

use std::fmt::Display;

use crate::driver::{DriverError, Row, Value};

pub use headcode::Headcode;
pub use operator::{AtocCode, InvalidAtocCode};
pub use service_uid::{InvalidServiceUid, ServiceUid};
pub use station::{Crs, InvalidCrs};

/// Read a text column and validate it with `parse`.
pub(crate) fn parse_column<T, E: Display>(
    row: &Row,
    column: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, DriverError> {
    let text = row.get_string(column)?;
    parse(&text).map_err(|err| DriverError::InvalidValue {
        column: column.to_string(),
        message: err.to_string(),
    })
}

/// Like [`parse_column`] for a nullable column.
pub(crate) fn parse_opt_column<T, E: Display>(
    row: &Row,
    column: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<Option<T>, DriverError> {
    match row.get_opt::<String>(column)? {
        None => Ok(None),
        Some(text) => parse(&text).map(Some).map_err(|err| DriverError::InvalidValue {
            column: column.to_string(),
            message: err.to_string(),
        }),
    }
}

fn text<T: Display>(code: T) -> Value {
    Value::Text(code.to_string())
}
