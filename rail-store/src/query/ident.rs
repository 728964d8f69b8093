//! Identifier escaping and parameter naming.

/// Quote an identifier for use in SQL text.
///
/// Embedded double quotes are doubled. Dotted names are treated as
/// qualified and each segment is quoted separately, so `stop.train_id`
/// becomes `"stop"."train_id"`.
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Base parameter name for a column: the last path segment, lowercased,
/// with anything outside `[a-z0-9_]` replaced by `_`.
pub fn param_base(column: &str) -> String {
    let last = column.rsplit('.').next().unwrap_or(column);
    last.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Parameter name for the `index`-th value bound against `column`.
pub fn indexed_param(column: &str, index: usize) -> String {
    format!("{}_{index}", param_base(column))
}

/// `wanted`, or `wanted` with the first free `_N` suffix if a parameter of
/// that name is already in `taken`. Keeps names unique within a statement
/// that filters the same column twice or two tables' same-named columns.
pub(crate) fn unique_param(taken: &[String], wanted: String) -> String {
    if !taken.contains(&wanted) {
        return wanted;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{wanted}_{n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Placeholder text for a parameter name.
pub(crate) fn placeholder(name: &str) -> String {
    format!("@{name}")
}
