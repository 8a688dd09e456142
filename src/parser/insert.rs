//! `parseInsertData` (§4.3, optional/gated by option): replay-oriented
//! parsing of `INSERT INTO t (cols) VALUES (...), (...)` into rows of
//! [`serde_json::Value`]. Used by restore-time validation fixtures, not by
//! the main backup/restore data path (which streams rows directly from the
//! source connection and never round-trips through this parser).

use anyhow::{anyhow, Result};

use super::common::{find_matching_paren, parse_column_list, split_top_level_commas, parse_table_ref, unquote_identifier};
use crate::domain::value_objects::{ColumnName, EngineKind, TableName};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInsert {
    pub table: TableName,
    pub columns: Option<Vec<ColumnName>>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

pub fn parse_insert(stmt: &str, engine: EngineKind) -> Result<ParsedInsert> {
    let upper = stmt.to_ascii_uppercase();
    let into_pos = upper.find("INTO").ok_or_else(|| anyhow!("not an INSERT statement"))? + "INTO".len();
    let values_pos = upper.find("VALUES").ok_or_else(|| anyhow!("INSERT has no VALUES clause"))?;

    let target = stmt[into_pos..values_pos].trim();
    let (table_part, columns) = match target.find('(') {
        Some(open) => {
            let chars: Vec<char> = target.chars().collect();
            let open_idx = target[..open].chars().count();
            let close_idx = find_matching_paren(&chars, open_idx)
                .ok_or_else(|| anyhow!("unbalanced column list in INSERT"))?;
            let col_list: String = chars[open_idx..=close_idx].iter().collect();
            (target[..open].trim(), Some(parse_column_list(&col_list)))
        }
        None => (target, None),
    };
    let (_, table_name) = parse_table_ref(table_part);

    let values_body = stmt[values_pos + "VALUES".len()..].trim().trim_end_matches(';');
    let tuples = split_value_tuples(values_body);
    let mut rows = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let inner = tuple.trim().trim_start_matches('(').trim_end_matches(')');
        let items = split_top_level_commas(inner);
        let row = items
            .iter()
            .map(|item| parse_literal(item.trim(), engine))
            .collect();
        rows.push(row);
    }

    Ok(ParsedInsert {
        table: TableName(table_name),
        columns,
        rows,
    })
}

/// Split `(...), (...), (...)` into its parenthesized tuples at depth 0,
/// honoring quoting the same way [`split_top_level_commas`] does.
fn split_value_tuples(body: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut tuples = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '(' {
            if let Some(close) = find_matching_paren(&chars, i) {
                tuples.push(chars[i..=close].iter().collect());
                i = close + 1;
                continue;
            }
        }
        i += 1;
    }
    tuples
}

fn parse_literal(token: &str, engine: EngineKind) -> serde_json::Value {
    let t = token.trim();
    if t.eq_ignore_ascii_case("null") {
        return serde_json::Value::Null;
    }
    if t.eq_ignore_ascii_case("true") {
        return serde_json::Value::Bool(true);
    }
    if t.eq_ignore_ascii_case("false") {
        return serde_json::Value::Bool(false);
    }
    if let Some(rest) = t.strip_prefix("X'").or_else(|| t.strip_prefix("x'")) {
        // SQLite hex blob literal.
        let hex = rest.trim_end_matches('\'');
        return serde_json::Value::String(format!("\\x{hex}"));
    }
    if engine == EngineKind::Mysql && (t.starts_with("0x") || t.starts_with("0X")) {
        return serde_json::Value::String(t.to_string());
    }
    if t.starts_with('\'') {
        return serde_json::Value::String(unquote_string_literal(t, engine));
    }
    if engine == EngineKind::Postgres && (t.starts_with("ARRAY[") || t.starts_with('{')) {
        return serde_json::Value::String(t.to_string());
    }
    if let Ok(n) = t.parse::<i64>() {
        return serde_json::Value::from(n);
    }
    if let Ok(f) = t.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(f) {
            return serde_json::Value::Number(num);
        }
    }
    // Function call or other raw expression: keep verbatim.
    serde_json::Value::String(t.to_string())
}

fn unquote_string_literal(t: &str, engine: EngineKind) -> String {
    let inner = t
        .trim_start_matches('\'')
        .trim_end_matches('\'');
    match engine {
        EngineKind::Mysql => inner.replace("\\'", "'").replace("''", "'"),
        _ => inner.replace("''", "'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_column_list_and_multiple_rows() {
        let stmt = "INSERT INTO t (id, name) VALUES (1, 'a'), (2, 'b');";
        let parsed = parse_insert(stmt, EngineKind::Postgres).unwrap();
        assert_eq!(parsed.table.0, "t");
        assert_eq!(parsed.columns.unwrap().len(), 2);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0][0], serde_json::json!(1));
        assert_eq!(parsed.rows[1][1], serde_json::json!("b"));
    }

    #[test]
    fn parses_without_column_list() {
        let stmt = "INSERT INTO t VALUES (1, NULL, true);";
        let parsed = parse_insert(stmt, EngineKind::Postgres).unwrap();
        assert!(parsed.columns.is_none());
        assert_eq!(parsed.rows[0][1], serde_json::Value::Null);
        assert_eq!(parsed.rows[0][2], serde_json::Value::Bool(true));
    }

    #[test]
    fn mysql_backslash_escape_unquoted() {
        let stmt = r"INSERT INTO t VALUES ('it\'s fine');";
        let parsed = parse_insert(stmt, EngineKind::Mysql).unwrap();
        assert_eq!(parsed.rows[0][0], serde_json::json!("it's fine"));
    }

    #[test]
    fn sqlite_hex_blob_literal_is_preserved() {
        let stmt = "INSERT INTO t VALUES (X'DEADBEEF');";
        let parsed = parse_insert(stmt, EngineKind::Sqlite).unwrap();
        assert_eq!(parsed.rows[0][0], serde_json::json!("\\xDEADBEEF"));
    }

    #[test]
    fn embedded_commas_in_string_values_do_not_split_the_tuple() {
        let stmt = "INSERT INTO t VALUES (1, 'a, b, c');";
        let parsed = parse_insert(stmt, EngineKind::Postgres).unwrap();
        assert_eq!(parsed.rows[0].len(), 2);
        assert_eq!(parsed.rows[0][1], serde_json::json!("a, b, c"));
    }
}
