//! SELECT builder.

use super::ident::quote_ident;
use super::predicate::{Filter, WhereClause};
use super::statement::Statement;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
enum Projection {
    Column(String),
    Expr { expr: String, alias: String },
}

/// SELECT statement builder.
///
/// # Examples
///
/// ```
/// use rail_store::query::{Filter, Select};
///
/// let base = Select::from("station").columns(["id", "crs", "name"]);
/// let by_id = base.clone().where_in("id", 2).build();
///
/// assert_eq!(
///     by_id.sql,
///     r#"SELECT "id", "crs", "name" FROM "station" WHERE "id" IN (@id_0, @id_1)"#
/// );
/// assert_eq!(by_id.params, vec!["id_0", "id_1"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    table: String,
    projection: Vec<Projection>,
    filter: WhereClause,
    group_by: Vec<String>,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            projection: Vec::new(),
            filter: WhereClause::default(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn column(mut self, column: &str) -> Self {
        self.projection.push(Projection::Column(column.to_string()));
        self
    }

    pub fn columns<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.projection
            .extend(columns.into_iter().map(|c| Projection::Column(c.to_string())));
        self
    }

    /// Computed column, e.g. `MAX("ordinal")`, exposed under `alias`.
    /// The expression is emitted verbatim.
    pub fn expr(mut self, expr: &str, alias: &str) -> Self {
        self.projection.push(Projection::Expr {
            expr: expr.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order_by.push((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether any WHERE predicate has been added.
    pub fn is_filtered(&self) -> bool {
        !self.filter.is_empty()
    }

    pub fn build(&self) -> Statement {
        let projection = if self.projection.is_empty() {
            "*".to_string()
        } else {
            self.projection
                .iter()
                .map(|p| match p {
                    Projection::Column(c) => quote_ident(c),
                    Projection::Expr { expr, alias } => {
                        format!("{expr} AS {}", quote_ident(alias))
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {projection} FROM {}", quote_ident(&self.table));
        let mut params = Vec::new();
        self.filter.render(&mut sql, &mut params);

        if !self.group_by.is_empty() {
            let cols: Vec<String> = self.group_by.iter().map(|c| quote_ident(c)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !self.order_by.is_empty() {
            let cols: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, order)| match order {
                    Order::Asc => format!("{} ASC", quote_ident(c)),
                    Order::Desc => format!("{} DESC", quote_ident(c)),
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&cols.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Statement { sql, params }
    }
}

impl Filter for Select {
    fn where_clause_mut(&mut self) -> &mut WhereClause {
        &mut self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfiltered_select_star() {
        let stmt = Select::from("train").build();
        assert_eq!(stmt.sql, r#"SELECT * FROM "train""#);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn single_key_collapses_to_equality() {
        let stmt = Select::from("station").column("id").where_in("id", 1).build();
        assert_eq!(stmt.sql, r#"SELECT "id" FROM "station" WHERE "id" = @id_0"#);
        assert_eq!(stmt.params, vec!["id_0"]);
    }

    #[test]
    fn empty_in_list_is_false() {
        let stmt = Select::from("station").where_in("id", 0).build();
        assert_eq!(stmt.sql, r#"SELECT * FROM "station" WHERE 1 = 0"#);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn tuple_in() {
        let stmt = Select::from("train")
            .column("id")
            .where_in_tuple(&["service_uid", "run_date"], 2)
            .build();
        assert_eq!(
            stmt.sql,
            r#"SELECT "id" FROM "train" WHERE ("service_uid", "run_date") IN ((@service_uid_0, @run_date_0), (@service_uid_1, @run_date_1))"#
        );
        assert_eq!(
            stmt.params,
            vec!["service_uid_0", "run_date_0", "service_uid_1", "run_date_1"]
        );
    }

    #[test]
    fn single_tuple_is_conjunction() {
        let stmt = Select::from("train")
            .where_in_tuple(&["service_uid", "run_date"], 1)
            .build();
        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "train" WHERE "service_uid" = @service_uid_0 AND "run_date" = @run_date_0"#
        );
    }

    #[test]
    fn aggregate_with_grouping_and_order() {
        let stmt = Select::from("stop")
            .column("train_id")
            .expr(r#"MAX("ordinal")"#, "max_ordinal")
            .where_in("train_id", 3)
            .group_by("train_id")
            .order_by("train_id", Order::Asc)
            .limit(10)
            .build();
        assert_eq!(
            stmt.sql,
            r#"SELECT "train_id", MAX("ordinal") AS "max_ordinal" FROM "stop" WHERE "train_id" IN (@train_id_0, @train_id_1, @train_id_2) GROUP BY "train_id" ORDER BY "train_id" ASC LIMIT 10"#
        );
    }

    #[test]
    fn clauses_render_in_sql_order_regardless_of_call_order() {
        let a = Select::from("stop")
            .order_by("ordinal", Order::Desc)
            .where_eq("train_id")
            .build();
        let b = Select::from("stop")
            .where_eq("train_id")
            .order_by("ordinal", Order::Desc)
            .build();
        assert_eq!(a, b);
    }

    #[test]
    fn repeated_columns_bind_distinct_parameters() {
        let stmt = Select::from("station").where_eq("crs").where_eq("crs").build();
        assert_eq!(stmt.sql, r#"SELECT * FROM "station" WHERE "crs" = @crs AND "crs" = @crs_1"#);
        assert_eq!(stmt.params, vec!["crs", "crs_1"]);

        let stmt = Select::from("stop")
            .where_in("stop.id", 2)
            .where_in("station.id", 2)
            .build();
        assert_eq!(stmt.params, vec!["id_0", "id_1", "id_0_1", "id_1_1"]);
        assert!(stmt.sql.ends_with(r#""station"."id" IN (@id_0_1, @id_1_1)"#));
    }

    #[test]
    fn clone_branches_do_not_share_predicates() {
        let base = Select::from("station").columns(["id", "name"]);
        let by_crs = base.clone().where_eq("crs");
        let by_id = base.clone().where_in("id", 2);

        assert!(!base.is_filtered());
        assert!(by_crs.build().sql.ends_with(r#"WHERE "crs" = @crs"#));
        assert_eq!(by_id.build().params, vec!["id_0", "id_1"]);
    }
}
