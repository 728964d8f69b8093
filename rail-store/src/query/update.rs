//! UPDATE builder.

use super::ident::{param_base, placeholder, quote_ident, unique_param};
use super::predicate::{Filter, WhereClause};
use super::statement::Statement;

/// Set-based UPDATE builder.
///
/// Assignments bind `@set_column` so they never collide with WHERE
/// parameters on the same column.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    table: String,
    assignments: Vec<String>,
    filter: WhereClause,
}

impl Update {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            assignments: Vec::new(),
            filter: WhereClause::default(),
        }
    }

    pub fn set(mut self, column: &str) -> Self {
        self.assignments.push(column.to_string());
        self
    }

    pub fn build(&self) -> Statement {
        let mut params = Vec::new();
        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|column| {
                let name = unique_param(&params, format!("set_{}", param_base(column)));
                let text = format!("{} = {}", quote_ident(column), placeholder(&name));
                params.push(name);
                text
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_ident(&self.table),
            sets.join(", ")
        );
        self.filter.render(&mut sql, &mut params);
        Statement { sql, params }
    }
}

impl Filter for Update {
    fn where_clause_mut(&mut self) -> &mut WhereClause {
        &mut self.filter
    }
}
