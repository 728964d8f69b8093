//! In-process driver.
//!
//! Executes the statement shapes emitted by [`crate::query`] against
//! tables held in memory: filtered selects, multi-row inserts and upserts
//! with `RETURNING`, set-based updates and deletes. WHERE clauses are
//! parsed from the SQL text and support the predicate family the builders
//! produce: equality, `IN` lists, row-value `IN`, `IS NULL` and the false
//! predicate `1 = 0`. Anything else, such as raw predicate text, is
//! rejected as unsupported. `ORDER BY`, `LIMIT` and aggregates are not
//! interpreted; tables that need aggregates register a [`QueryHandler`].
//!
//! Every executed command is counted and logged so callers can assert on
//! round trips.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::trace;

use super::error::DriverError;
use super::row::Row;
use super::value::Value;
use super::{Command, Connection, Reader, RowsReader};

/// Custom SELECT evaluation for one table.
///
/// Receives the command and the table's current rows. Returning `None`
/// falls back to the default parameter filter.
pub type QueryHandler = Box<dyn Fn(&Command, &[Row]) -> Option<Vec<Row>>>;

/// Shape of an in-memory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    key_column: String,
    serial: bool,
    unique: Vec<Vec<String>>,
}

impl TableSpec {
    /// A table keyed by `key_column`. Inserts must supply the key.
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            serial: false,
            unique: Vec::new(),
        }
    }

    /// Generate integer keys for inserts that omit the key column.
    pub fn serial(mut self) -> Self {
        self.serial = true;
        self
    }

    /// Add a uniqueness constraint over `columns`.
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}

struct MemoryTable {
    spec: TableSpec,
    rows: Vec<Row>,
    next_key: i64,
    handler: Option<QueryHandler>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    queries: usize,
    non_queries: usize,
    log: Vec<String>,
}

/// In-memory [`Connection`].
#[derive(Default)]
pub struct MemoryConnection {
    state: RefCell<MemoryState>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Replaces any existing table of the same name.
    pub fn create_table(&self, name: &str, spec: TableSpec) {
        self.state.borrow_mut().tables.insert(
            name.to_string(),
            MemoryTable {
                spec,
                rows: Vec::new(),
                next_key: 1,
                handler: None,
            },
        );
    }

    /// Install a custom SELECT handler for `table`.
    pub fn set_query_handler(&self, table: &str, handler: QueryHandler) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        let table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DriverError::UnknownTable(table.to_string()))?;
        table.handler = Some(handler);
        Ok(())
    }

    /// Seed a row directly, bypassing command counting.
    pub fn insert_row(&self, table: &str, row: Row) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        let table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| DriverError::UnknownTable(table.to_string()))?;
        if let Ok(Value::Int(key)) = row.get(&table.spec.key_column) {
            table.next_key = table.next_key.max(key + 1);
        }
        table.rows.push(row);
        Ok(())
    }

    /// Snapshot of a table's rows in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<Row>, DriverError> {
        let state = self.state.borrow();
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| DriverError::UnknownTable(table.to_string()))
    }

    /// Number of row-returning commands executed.
    pub fn query_count(&self) -> usize {
        self.state.borrow().queries
    }

    /// Number of non-query commands executed.
    pub fn non_query_count(&self) -> usize {
        self.state.borrow().non_queries
    }

    /// Total commands executed of either kind.
    pub fn command_count(&self) -> usize {
        let state = self.state.borrow();
        state.queries + state.non_queries
    }

    /// SQL text of every executed command, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    pub fn reset_counters(&self) {
        let mut state = self.state.borrow_mut();
        state.queries = 0;
        state.non_queries = 0;
        state.log.clear();
    }

    fn run(&self, command: &Command) -> Result<(Vec<Row>, u64), DriverError> {
        let mut state = self.state.borrow_mut();
        state.log.push(command.sql().to_string());
        trace!(sql = command.sql(), params = command.parameters().len(), "memory driver");

        let sql = command.sql();
        let verb = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match verb.as_str() {
            "SELECT" => {
                let table = table_after(sql, " FROM ")?;
                let table = state.table(&table)?;
                if let Some(handler) = &table.handler
                    && let Some(rows) = handler(command, &table.rows)
                {
                    return Ok((rows, 0));
                }
                let filter = Filters::parse(command)?;
                let rows: Vec<Row> = table
                    .rows
                    .iter()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect();
                Ok((rows, 0))
            }
            "INSERT" => {
                let name = table_after(sql, "INSERT INTO ")?;
                let table = state.table_mut(&name)?;
                let (rows, count) = insert(table, &name, command)?;
                let returned = if sql.contains(" RETURNING ") {
                    rows
                } else {
                    Vec::new()
                };
                Ok((returned, count))
            }
            "UPDATE" => {
                let name = table_after(sql, "UPDATE ")?;
                let table = state.table_mut(&name)?;
                let filter = Filters::parse(command)?;
                let assignments = assignments(command)?;
                let mut count = 0;
                for row in table.rows.iter_mut().filter(|r| filter.matches(r)) {
                    for (column, value) in &assignments {
                        row.set(column.clone(), value.clone());
                    }
                    count += 1;
                }
                Ok((Vec::new(), count))
            }
            "DELETE" => {
                let name = table_after(sql, "DELETE FROM ")?;
                let table = state.table_mut(&name)?;
                let filter = Filters::parse(command)?;
                let before = table.rows.len();
                table.rows.retain(|r| !filter.matches(r));
                Ok((Vec::new(), (before - table.rows.len()) as u64))
            }
            _ => Err(DriverError::Unsupported(sql.to_string())),
        }
    }
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&MemoryTable, DriverError> {
        self.tables
            .get(name)
            .ok_or_else(|| DriverError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, DriverError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DriverError::UnknownTable(name.to_string()))
    }
}

impl Connection for MemoryConnection {
    fn execute_reader<'a>(&'a self, command: &Command) -> Result<Box<dyn Reader + 'a>, DriverError> {
        let (rows, _) = self.run(command)?;
        self.state.borrow_mut().queries += 1;
        Ok(Box::new(RowsReader::new(rows)))
    }

    fn execute_non_query(&self, command: &Command) -> Result<u64, DriverError> {
        let (_, count) = self.run(command)?;
        self.state.borrow_mut().non_queries += 1;
        Ok(count)
    }
}

/// One predicate of a parsed WHERE clause.
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Never,
    IsNull(String),
    /// Equality is a one-element list.
    In(String, Vec<Value>),
    TupleIn(Vec<String>, Vec<Vec<Value>>),
}

impl Condition {
    fn matches(&self, row: &Row) -> bool {
        let equals = |column: &str, value: &Value| {
            row.try_get(column)
                .is_some_and(|held| !held.is_null() && held == value)
        };
        match self {
            Condition::Never => false,
            Condition::IsNull(column) => row.try_get(column).is_none_or(Value::is_null),
            Condition::In(column, values) => values.iter().any(|v| equals(column, v)),
            Condition::TupleIn(columns, tuples) => tuples
                .iter()
                .any(|tuple| columns.iter().zip(tuple).all(|(c, v)| equals(c, v))),
        }
    }
}

/// Conjunction of the conditions in a command's WHERE clause.
#[derive(Debug)]
struct Filters {
    conditions: Vec<Condition>,
}

impl Filters {
    fn parse(command: &Command) -> Result<Self, DriverError> {
        let sql = command.sql();
        let conditions = match clause_after(sql, " WHERE ") {
            Some(clause) => clause
                .split(" AND ")
                .map(|text| condition(text.trim(), command))
                .collect::<Result<_, _>>()?,
            None => Vec::new(),
        };
        Ok(Self { conditions })
    }

    fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }
}

/// Text following `keyword` up to the next clause keyword.
fn clause_after<'a>(sql: &'a str, keyword: &str) -> Option<&'a str> {
    let start = sql.find(keyword)? + keyword.len();
    let rest = &sql[start..];
    let end = [" WHERE ", " GROUP BY ", " ORDER BY ", " LIMIT ", " RETURNING "]
        .iter()
        .filter_map(|k| rest.find(k))
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn condition(text: &str, command: &Command) -> Result<Condition, DriverError> {
    let unsupported = || DriverError::Unsupported(command.sql().to_string());
    if text == "1 = 0" {
        return Ok(Condition::Never);
    }
    if let Some(mut rest) = text.strip_prefix('(') {
        let mut columns = Vec::new();
        loop {
            let (column, after) = qualified_ident(rest).ok_or_else(unsupported)?;
            columns.push(column);
            let after = after.trim_start();
            match after.strip_prefix(',') {
                Some(next) => rest = next,
                None if after.starts_with(')') => break,
                None => return Err(unsupported()),
            }
        }
        let list = text.split_once(" IN ").ok_or_else(unsupported)?.1;
        let values = bound_values(list, command)?;
        if columns.is_empty() || values.len() % columns.len() != 0 {
            return Err(unsupported());
        }
        let tuples = values.chunks(columns.len()).map(<[Value]>::to_vec).collect();
        return Ok(Condition::TupleIn(columns, tuples));
    }

    let (column, rest) = qualified_ident(text).ok_or_else(unsupported)?;
    let rest = rest.trim_start();
    if rest == "IS NULL" {
        Ok(Condition::IsNull(column))
    } else if let Some(value) = rest.strip_prefix("= ") {
        let values = bound_values(value, command)?;
        if values.len() != 1 {
            return Err(unsupported());
        }
        Ok(Condition::In(column, values))
    } else if let Some(list) = rest.strip_prefix("IN ") {
        Ok(Condition::In(column, bound_values(list, command)?))
    } else {
        Err(unsupported())
    }
}

/// `SET "a" = @p, "b" = @q` of an UPDATE, with bound values.
fn assignments(command: &Command) -> Result<Vec<(String, Value)>, DriverError> {
    let unsupported = || DriverError::Unsupported(command.sql().to_string());
    let clause = clause_after(command.sql(), " SET ").ok_or_else(unsupported)?;
    clause
        .split(", ")
        .map(|text| {
            let (column, rest) = qualified_ident(text).ok_or_else(unsupported)?;
            let value = rest.trim_start().strip_prefix("= ").ok_or_else(unsupported)?;
            let mut values = bound_values(value, command)?;
            match (values.pop(), values.is_empty()) {
                (Some(value), true) => Ok((column, value)),
                _ => Err(unsupported()),
            }
        })
        .collect()
}

/// Values bound to every `@name` placeholder in `text`, in order.
fn bound_values(text: &str, command: &Command) -> Result<Vec<Value>, DriverError> {
    text.split('@')
        .skip(1)
        .map(|part| {
            let end = part
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(part.len());
            let name = &part[..end];
            command
                .parameter(name)
                .cloned()
                .ok_or_else(|| DriverError::MissingParameter(name.to_string()))
        })
        .collect()
}

/// A possibly qualified identifier; only the last segment names the column.
fn qualified_ident(s: &str) -> Option<(String, &str)> {
    let (mut name, mut rest) = read_ident(s)?;
    while let Some(next) = rest.strip_prefix('.') {
        (name, rest) = read_ident(next)?;
    }
    Some((name, rest))
}

fn insert(table: &mut MemoryTable, name: &str, command: &Command) -> Result<(Vec<Row>, u64), DriverError> {
    let sql = command.sql();
    let columns = ident_list_after(sql, &format!("INSERT INTO {} ", crate::query::quote_ident(name)))?;
    let conflict = match sql.find("ON CONFLICT ") {
        Some(pos) => Some(ident_list_after(&sql[pos..], "ON CONFLICT ")?),
        None => None,
    };
    let do_nothing = sql.contains(" DO NOTHING");

    let parameters = command.parameters();
    if columns.is_empty() || parameters.len() % columns.len() != 0 {
        return Err(DriverError::Unsupported(sql.to_string()));
    }
    let mut returned = Vec::with_capacity(parameters.len() / columns.len());

    // Values are bound row-major, in column order
    for values in parameters.chunks(columns.len()) {
        let mut row = Row::new();
        for (column, (_, value)) in columns.iter().zip(values) {
            row.set(column.clone(), value.clone());
        }

        if let Some(target) = &conflict
            && let Some(existing) = table
                .rows
                .iter_mut()
                .find(|r| same_values(r, &row, target))
        {
            if !do_nothing {
                for column in columns.iter().filter(|c| !target.contains(*c)) {
                    if let Some(value) = row.try_get(column) {
                        existing.set(column.clone(), value.clone());
                    }
                }
                returned.push(existing.clone());
            }
            continue;
        }

        let key_column = table.spec.key_column.clone();
        let supplied = row.try_get(&key_column).filter(|v| !v.is_null()).cloned();
        match supplied {
            None if table.spec.serial => {
                row.set(key_column.clone(), table.next_key);
                table.next_key += 1;
            }
            None => {
                return Err(DriverError::Constraint {
                    table: name.to_string(),
                    message: format!("{key_column} is required"),
                });
            }
            Some(Value::Int(key)) => {
                table.next_key = table.next_key.max(key + 1);
            }
            Some(_) => {}
        }

        let key = [key_column];
        for constraint in std::iter::once(&key[..]).chain(table.spec.unique.iter().map(Vec::as_slice)) {
            if table.rows.iter().any(|r| same_values(r, &row, constraint)) {
                return Err(DriverError::Constraint {
                    table: name.to_string(),
                    message: format!("duplicate value for ({})", constraint.join(", ")),
                });
            }
        }

        table.rows.push(row.clone());
        returned.push(row);
    }

    let count = returned.len() as u64;
    Ok((returned, count))
}

fn same_values(a: &Row, b: &Row, columns: &[String]) -> bool {
    columns
        .iter()
        .all(|c| matches!((a.try_get(c), b.try_get(c)), (Some(x), Some(y)) if x == y && !x.is_null()))
}

/// Read a double-quoted identifier at the start of `s`.
fn read_ident(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();
    let mut chars = s.char_indices();
    if chars.next()?.1 != '"' {
        return None;
    }
    let mut out = String::new();
    let mut iter = chars.peekable();
    while let Some((i, c)) = iter.next() {
        if c == '"' {
            if iter.peek().is_some_and(|(_, next)| *next == '"') {
                iter.next();
                out.push('"');
            } else {
                return Some((out, &s[i + 1..]));
            }
        } else {
            out.push(c);
        }
    }
    None
}

fn table_after(sql: &str, keyword: &str) -> Result<String, DriverError> {
    sql.find(keyword)
        .and_then(|pos| read_ident(&sql[pos + keyword.len()..]))
        .map(|(name, _)| name)
        .ok_or_else(|| DriverError::Unsupported(sql.to_string()))
}

/// Parse `("a", "b", ...)` following `prefix`.
fn ident_list_after(sql: &str, prefix: &str) -> Result<Vec<String>, DriverError> {
    let unsupported = || DriverError::Unsupported(sql.to_string());
    let pos = sql.find(prefix).ok_or_else(unsupported)?;
    let mut rest = sql[pos + prefix.len()..]
        .trim_start()
        .strip_prefix('(')
        .ok_or_else(unsupported)?;

    let mut names = Vec::new();
    loop {
        let (name, after) = read_ident(rest).ok_or_else(unsupported)?;
        names.push(name);
        let after = after.trim_start();
        if let Some(next) = after.strip_prefix(',') {
            rest = next;
        } else if after.starts_with(')') {
            return Ok(names);
        } else {
            return Err(unsupported());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Delete, Filter, Insert, Select, Update};

    fn stations() -> MemoryConnection {
        let conn = MemoryConnection::new();
        conn.create_table("station", TableSpec::new("id").serial().unique(&["crs"]));
        conn
    }

    fn upsert(conn: &MemoryConnection, rows: &[(&str, &str)]) -> Vec<Row> {
        let stmt = Insert::into("station")
            .columns(["crs", "name"])
            .rows(rows.len())
            .on_duplicate_key(["crs"])
            .returning(["id", "crs", "name"])
            .build();
        let values = rows
            .iter()
            .flat_map(|(crs, name)| [Value::from(*crs), Value::from(*name)]);
        let cmd = stmt.command(conn, false, values).unwrap();
        let mut reader = conn.execute_reader(&cmd).unwrap();
        let mut out = Vec::new();
        while let Some(row) = reader.read().unwrap() {
            out.push(row);
        }
        out
    }

    #[test]
    fn insert_assigns_serial_keys() {
        let conn = stations();
        let rows = upsert(&conn, &[("PAD", "London Paddington"), ("RDG", "Reading")]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_i64("id").unwrap(), 1);
        assert_eq!(rows[1].get_i64("id").unwrap(), 2);
    }

    #[test]
    fn upsert_updates_on_conflict() {
        let conn = stations();
        upsert(&conn, &[("PAD", "Paddington")]);
        let rows = upsert(&conn, &[("PAD", "London Paddington")]);

        assert_eq!(rows[0].get_i64("id").unwrap(), 1);
        let stored = conn.rows("station").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_string("name").unwrap(), "London Paddington");
    }

    #[test]
    fn plain_insert_enforces_unique() {
        let conn = stations();
        upsert(&conn, &[("PAD", "Paddington")]);

        let stmt = Insert::into("station").columns(["crs", "name"]).build();
        let cmd = stmt
            .command(&conn, false, [Value::from("PAD"), Value::from("Again")])
            .unwrap();
        assert!(matches!(
            conn.execute_non_query(&cmd),
            Err(DriverError::Constraint { .. })
        ));
    }

    #[test]
    fn select_filters_by_parameters() {
        let conn = stations();
        upsert(&conn, &[("PAD", "Paddington"), ("RDG", "Reading"), ("BRI", "Bristol")]);
        conn.reset_counters();

        let stmt = Select::from("station").where_in("crs", 2).build();
        let cmd = stmt
            .command(&conn, false, [Value::from("RDG"), Value::from("BRI")])
            .unwrap();
        let mut reader = conn.execute_reader(&cmd).unwrap();
        let mut names = Vec::new();
        while let Some(row) = reader.read().unwrap() {
            names.push(row.get_string("name").unwrap());
        }

        assert_eq!(names, vec!["Reading", "Bristol"]);
        assert_eq!(conn.query_count(), 1);
    }

    #[test]
    fn update_and_delete() {
        let conn = stations();
        upsert(&conn, &[("PAD", "Paddington"), ("RDG", "Reading")]);

        let stmt = Update::table("station").set("name").where_eq("crs").build();
        let cmd = stmt
            .command(&conn, false, [Value::from("Reading Central"), Value::from("RDG")])
            .unwrap();
        assert_eq!(conn.execute_non_query(&cmd).unwrap(), 1);

        let stmt = Delete::from("station").where_in("id", 1).build();
        let cmd = stmt.command(&conn, false, [Value::Int(1)]).unwrap();
        assert_eq!(conn.execute_non_query(&cmd).unwrap(), 1);

        let rows = conn.rows("station").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_string("name").unwrap(), "Reading Central");
        assert_eq!(conn.non_query_count(), 2);
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let conn = stations();
        upsert(&conn, &[("PAD", "Paddington")]);
        let stmt = Select::from("station").where_in("id", 0).build();
        let cmd = stmt.command(&conn, false, []).unwrap();
        let mut reader = conn.execute_reader(&cmd).unwrap();
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn unknown_table() {
        let conn = MemoryConnection::new();
        let cmd = Command::new(r#"SELECT * FROM "nowhere""#, false);
        assert!(matches!(
            conn.execute_reader(&cmd),
            Err(DriverError::UnknownTable(t)) if t == "nowhere"
        ));
    }

    fn select(
        conn: &MemoryConnection,
        select: Select,
        values: Vec<Value>,
    ) -> Result<Vec<Row>, DriverError> {
        let cmd = select.build().command(conn, false, values)?;
        let mut reader = conn.execute_reader(&cmd)?;
        let mut out = Vec::new();
        while let Some(row) = reader.read()? {
            out.push(row);
        }
        Ok(out)
    }

    #[test]
    fn tuple_in_matches_whole_rows_only() {
        let conn = MemoryConnection::new();
        conn.create_table("train", TableSpec::new("id").serial());
        for (id, uid, day) in [(1i64, "A", 1i64), (2, "A", 2), (3, "B", 2), (4, "B", 1)] {
            conn.insert_row("train", Row::new().with("id", id).with("uid", uid).with("day", day))
                .unwrap();
        }

        let rows = select(
            &conn,
            Select::from("train").where_in_tuple(&["uid", "day"], 2),
            vec![Value::from("A"), Value::Int(1), Value::from("B"), Value::Int(2)],
        )
        .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.get_i64("id").unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn repeated_column_predicates_all_apply() {
        let conn = stations();
        upsert(&conn, &[("PAD", "Paddington"), ("RDG", "Reading")]);
        let both = || Select::from("station").where_eq("crs").where_eq("crs");

        let rows = select(&conn, both(), vec![Value::from("PAD"), Value::from("RDG")]).unwrap();
        assert!(rows.is_empty());
        let rows = select(&conn, both(), vec![Value::from("RDG"), Value::from("RDG")]).unwrap();
        assert_eq!(rows.len(), 1);

        let rows = select(
            &conn,
            Select::from("station").where_in("station.id", 2).where_null("name"),
            vec![Value::Int(1), Value::Int(2)],
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn raw_predicates_are_unsupported() {
        let conn = stations();
        let result = select(&conn, Select::from("station").where_raw("length(name) > 3"), vec![]);
        assert!(matches!(result, Err(DriverError::Unsupported(_))));
    }
}
