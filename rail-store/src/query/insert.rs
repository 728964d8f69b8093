//! INSERT builder, including the upsert form.

use super::ident::{indexed_param, placeholder, quote_ident};
use super::statement::Statement;

/// Multi-row INSERT builder.
///
/// Values are bound row-major: every column of row 0, then row 1, and so
/// on, with parameter names `@column_row`.
///
/// # Examples
///
/// ```
/// use rail_store::query::Insert;
///
/// let stmt = Insert::into("station")
///     .columns(["crs", "name"])
///     .rows(2)
///     .on_duplicate_key(["crs"])
///     .returning(["id"])
///     .build();
///
/// assert_eq!(
///     stmt.sql,
///     r#"INSERT INTO "station" ("crs", "name") VALUES (@crs_0, @name_0), (@crs_1, @name_1) ON CONFLICT ("crs") DO UPDATE SET "name" = EXCLUDED."name" RETURNING "id""#
/// );
/// assert_eq!(stmt.params, vec!["crs_0", "name_0", "crs_1", "name_1"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    table: String,
    columns: Vec<String>,
    rows: usize,
    conflict: Option<Vec<String>>,
    returning: Vec<String>,
}

impl Insert {
    pub fn into(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            rows: 1,
            conflict: None,
            returning: Vec::new(),
        }
    }

    pub fn columns<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.columns.extend(columns.into_iter().map(str::to_string));
        self
    }

    /// Number of value tuples. Defaults to one.
    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    /// Turn the insert into an upsert on the given uniqueness key.
    ///
    /// Every inserted column outside the key is overwritten from the
    /// incoming row on conflict. If the key covers every column the
    /// conflict is ignored instead.
    pub fn on_duplicate_key<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.conflict = Some(columns.into_iter().map(str::to_string).collect());
        self
    }

    pub fn returning<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.returning
            .extend(columns.into_iter().map(str::to_string));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn build(&self) -> Statement {
        let quoted: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        let mut params = Vec::with_capacity(self.columns.len() * self.rows);

        let tuples: Vec<String> = (0..self.rows)
            .map(|row| {
                let values: Vec<String> = self
                    .columns
                    .iter()
                    .map(|column| {
                        let name = indexed_param(column, row);
                        let text = placeholder(&name);
                        params.push(name);
                        text
                    })
                    .collect();
                format!("({})", values.join(", "))
            })
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(&self.table),
            quoted.join(", "),
            tuples.join(", ")
        );

        if let Some(conflict) = &self.conflict {
            let target: Vec<String> = conflict.iter().map(|c| quote_ident(c)).collect();
            let updates: Vec<String> = self
                .columns
                .iter()
                .filter(|c| !conflict.contains(*c))
                .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
                .collect();

            sql.push_str(&format!(" ON CONFLICT ({})", target.join(", ")));
            if updates.is_empty() {
                sql.push_str(" DO NOTHING");
            } else {
                sql.push_str(" DO UPDATE SET ");
                sql.push_str(&updates.join(", "));
            }
        }

        if !self.returning.is_empty() {
            let cols: Vec<String> = self.returning.iter().map(|c| quote_ident(c)).collect();
            sql.push_str(" RETURNING ");
            sql.push_str(&cols.join(", "));
        }

        Statement { sql, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_single_row_insert() {
        let stmt = Insert::into("train")
            .columns(["service_uid", "run_date"])
            .build();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "train" ("service_uid", "run_date") VALUES (@service_uid_0, @run_date_0)"#
        );
        assert_eq!(stmt.params, vec!["service_uid_0", "run_date_0"]);
    }

    #[test]
    fn composite_conflict_key() {
        let stmt = Insert::into("stop")
            .columns(["train_id", "ordinal", "platform"])
            .on_duplicate_key(["train_id", "ordinal"])
            .build();
        assert!(stmt.sql.ends_with(
            r#"ON CONFLICT ("train_id", "ordinal") DO UPDATE SET "platform" = EXCLUDED."platform""#
        ));
    }

    #[test]
    fn conflict_covering_every_column_does_nothing() {
        let stmt = Insert::into("station")
            .columns(["crs"])
            .on_duplicate_key(["crs"])
            .build();
        assert!(stmt.sql.ends_with(r#"ON CONFLICT ("crs") DO NOTHING"#));
    }

    #[test]
    fn parameters_are_row_major() {
        let stmt = Insert::into("stop").columns(["a", "b"]).rows(3).build();
        assert_eq!(
            stmt.params,
            vec!["a_0", "b_0", "a_1", "b_1", "a_2", "b_2"]
        );
    }
}
