//! Minimal relational driver abstraction.
//!
//! The mapping layer only needs four things from a database: build a
//! command from SQL text, bind named parameters, run it for rows, and run
//! it for an affected-row count. Production drivers implement
//! [`Connection`]; [`MemoryConnection`] is an in-process implementation
//! that understands the statement shapes produced by [`crate::query`].

mod error;
mod memory;
mod row;
mod value;

pub use error::DriverError;
pub use memory::{MemoryConnection, QueryHandler, TableSpec};
pub use row::Row;
pub use value::{FromValue, Value, ValueError};

/// A parameterised SQL command.
///
/// Parameter names are stored without the `@` sigil used in the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    sql: String,
    prepared: bool,
    parameters: Vec<(String, Value)>,
}

impl Command {
    /// Create a command with no parameters bound.
    pub fn new(sql: impl Into<String>, prepared: bool) -> Self {
        Self {
            sql: sql.into(),
            prepared,
            parameters: Vec::new(),
        }
    }

    /// Bind a named parameter.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameters.push((name.into(), value.into()));
    }

    /// Remove every bound parameter, keeping the SQL text.
    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    /// Value bound to `name`, if any.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Forward-only row cursor.
pub trait Reader {
    /// Advance to the next row. Returns `None` once exhausted.
    fn read(&mut self) -> Result<Option<Row>, DriverError>;
}

/// A database connection as seen by the mapping layer.
///
/// Methods take `&self` so one connection can be shared by every mapper
/// of a unit of work; drivers use interior mutability where needed.
pub trait Connection {
    /// Create a command for `sql`. `prepared` hints that the driver may
    /// cache a server-side plan for repeated use.
    fn create_command(&self, sql: &str, prepared: bool) -> Command {
        Command::new(sql, prepared)
    }

    /// Execute a row-returning command.
    fn execute_reader<'a>(&'a self, command: &Command) -> Result<Box<dyn Reader + 'a>, DriverError>;

    /// Execute a command for its affected-row count.
    fn execute_non_query(&self, command: &Command) -> Result<u64, DriverError>;
}

/// Reader over rows already materialised in memory.
#[derive(Debug)]
pub struct RowsReader {
    rows: std::vec::IntoIter<Row>,
}

impl RowsReader {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl Reader for RowsReader {
    fn read(&mut self) -> Result<Option<Row>, DriverError> {
        Ok(self.rows.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parameters() {
        let mut cmd = Command::new("SELECT 1", true);
        cmd.add_parameter("id_0", 5i64);
        cmd.add_parameter("id_1", 6i64);

        assert!(cmd.is_prepared());
        assert_eq!(cmd.parameter("id_1"), Some(&Value::Int(6)));
        assert_eq!(cmd.parameter("id_2"), None);

        cmd.clear_parameters();
        assert!(cmd.parameters().is_empty());
        assert_eq!(cmd.sql(), "SELECT 1");
    }

    #[test]
    fn rows_reader_is_forward_only() {
        let mut reader = RowsReader::new(vec![Row::new().with("id", 1i64)]);
        assert!(reader.read().unwrap().is_some());
        assert!(reader.read().unwrap().is_none());
        assert!(reader.read().unwrap().is_none());
    }
}
