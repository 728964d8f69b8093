//! Built statements and parameter binding.

use crate::driver::{Command, Connection, DriverError, Value};

/// SQL text plus the ordered list of parameter names it expects.
///
/// Names are stored without the `@` sigil. Values passed to
/// [`Statement::command`] are bound positionally against this list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<String>,
}

impl Statement {
    /// Create a command on `conn` and bind `values` in parameter order.
    pub fn command<I>(
        &self,
        conn: &dyn Connection,
        prepared: bool,
        values: I,
    ) -> Result<Command, DriverError>
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();
        if values.len() != self.params.len() {
            return Err(DriverError::ParameterCount {
                expected: self.params.len(),
                actual: values.len(),
            });
        }

        let mut command = conn.create_command(&self.sql, prepared);
        for (name, value) in self.params.iter().zip(values) {
            command.add_parameter(name.clone(), value);
        }
        Ok(command)
    }
}
