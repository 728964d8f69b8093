//! WHERE clause construction shared by the select, update and delete builders.

use super::ident::{indexed_param, param_base, placeholder, quote_ident, unique_param};

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(String),
    In { column: String, count: usize },
    TupleIn { columns: Vec<String>, count: usize },
    IsNull(String),
    Raw(String),
}

/// Conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    predicates: Vec<Predicate>,
}

impl WhereClause {
    pub(crate) fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Append ` WHERE ...` to `sql`, recording parameter names in order.
    pub(crate) fn render(&self, sql: &mut String, params: &mut Vec<String>) {
        if self.predicates.is_empty() {
            return;
        }
        let parts: Vec<String> = self
            .predicates
            .iter()
            .map(|p| render_predicate(p, params))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&parts.join(" AND "));
    }
}

/// Record `wanted` (made unique) as the next parameter and return its
/// placeholder text.
fn bind(params: &mut Vec<String>, wanted: String) -> String {
    let name = unique_param(params, wanted);
    let text = placeholder(&name);
    params.push(name);
    text
}

fn render_predicate(predicate: &Predicate, params: &mut Vec<String>) -> String {
    match predicate {
        Predicate::Eq(column) => {
            format!("{} = {}", quote_ident(column), bind(params, param_base(column)))
        }
        Predicate::In { count: 0, .. } | Predicate::TupleIn { count: 0, .. } => "1 = 0".to_string(),
        Predicate::In { column, count: 1 } => {
            format!("{} = {}", quote_ident(column), bind(params, indexed_param(column, 0)))
        }
        Predicate::In { column, count } => {
            let list: Vec<String> = (0..*count)
                .map(|i| bind(params, indexed_param(column, i)))
                .collect();
            format!("{} IN ({})", quote_ident(column), list.join(", "))
        }
        Predicate::TupleIn { columns, count: 1 } => {
            let parts: Vec<String> = columns
                .iter()
                .map(|column| {
                    format!("{} = {}", quote_ident(column), bind(params, indexed_param(column, 0)))
                })
                .collect();
            parts.join(" AND ")
        }
        Predicate::TupleIn { columns, count } => {
            let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
            let tuples: Vec<String> = (0..*count)
                .map(|i| {
                    let row: Vec<String> = columns
                        .iter()
                        .map(|column| bind(params, indexed_param(column, i)))
                        .collect();
                    format!("({})", row.join(", "))
                })
                .collect();
            format!("({}) IN ({})", quoted.join(", "), tuples.join(", "))
        }
        Predicate::IsNull(column) => format!("{} IS NULL", quote_ident(column)),
        Predicate::Raw(text) => text.clone(),
    }
}

/// WHERE-clause methods shared by every filtering builder.
///
/// All methods consume and return the builder so calls chain; clone the
/// builder first to branch a shared base query.
pub trait Filter: Sized {
    #[doc(hidden)]
    fn where_clause_mut(&mut self) -> &mut WhereClause;

    /// `"column" = @column`
    fn where_eq(mut self, column: &str) -> Self {
        self.where_clause_mut()
            .predicates
            .push(Predicate::Eq(column.to_string()));
        self
    }

    /// Array membership over `count` placeholders `@column_0 .. @column_{count-1}`.
    ///
    /// A single value renders as the equality `"column" = @column_0`, which
    /// plans better than a one-element list. Zero values render as a false
    /// predicate.
    fn where_in(mut self, column: &str, count: usize) -> Self {
        self.where_clause_mut().predicates.push(Predicate::In {
            column: column.to_string(),
            count,
        });
        self
    }

    /// Row-value membership: `("a", "b") IN ((@a_0, @b_0), ...)`.
    ///
    /// Parameters are bound row by row. One row renders as a conjunction of
    /// equalities.
    fn where_in_tuple(mut self, columns: &[&str], count: usize) -> Self {
        self.where_clause_mut().predicates.push(Predicate::TupleIn {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            count,
        });
        self
    }

    /// `"column" IS NULL`
    fn where_null(mut self, column: &str) -> Self {
        self.where_clause_mut()
            .predicates
            .push(Predicate::IsNull(column.to_string()));
        self
    }

    /// Verbatim predicate text. Must not contain placeholders.
    fn where_raw(mut self, predicate: &str) -> Self {
        self.where_clause_mut()
            .predicates
            .push(Predicate::Raw(predicate.to_string()));
        self
    }
}
