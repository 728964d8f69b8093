//! DELETE builder.

use super::ident::quote_ident;
use super::predicate::{Filter, WhereClause};
use super::statement::Statement;

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    table: String,
    filter: WhereClause,
}

impl Delete {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: WhereClause::default(),
        }
    }

    pub fn build(&self) -> Statement {
        let mut sql = format!("DELETE FROM {}", quote_ident(&self.table));
        let mut params = Vec::new();
        self.filter.render(&mut sql, &mut params);
        Statement { sql, params }
    }
}

impl Filter for Delete {
    fn where_clause_mut(&mut self) -> &mut WhereClause {
        &mut self.filter
    }
}
