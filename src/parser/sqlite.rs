//! SQLite dialect parser (§4.3). `ALTER TABLE` support is narrow — only
//! ADD COLUMN, RENAME TO, DROP COLUMN, RENAME COLUMN are legal SQLite DDL.
//! Anything else is recorded as an advisory warning with a suggested
//! `CREATE INDEX` equivalent rather than failing the parse.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::OnceLock;

use super::common::{
    apply_table_item, find_matching_paren, parse_column_list, parse_default_expr,
    parse_table_ref, split_top_level_commas, unquote_identifier,
};
use super::{classify, ParseReport, StatementKind};
use crate::domain::schema::{
    Column, Index, IndexColumn, IndexType, LogicalType, SortDirection, Table,
};
use crate::domain::value_objects::{ColumnName, IndexName};

fn autoincrement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\bINTEGER\s+PRIMARY\s+KEY\s+AUTOINCREMENT\b").unwrap())
}

pub fn parse_statements(statements: &[String], strict: bool) -> Result<ParseReport> {
    let mut report = ParseReport::default();

    for (idx, stmt) in statements.iter().enumerate() {
        match classify(stmt) {
            StatementKind::CreateTable => match parse_create_table(stmt) {
                Ok(table) => report.tables.push(table),
                Err(e) if strict => return Err(anyhow!("statement {idx}: {e}")),
                Err(e) => report.warnings.push(format!("statement {idx} skipped: {e}")),
            },
            StatementKind::AlterTable => match apply_alter_table(&mut report.tables, stmt) {
                Ok(Some(advisory)) => report.warnings.push(advisory),
                Ok(None) => {}
                Err(e) if strict => return Err(anyhow!("statement {idx}: {e}")),
                Err(e) => report.warnings.push(format!("statement {idx} skipped: {e}")),
            },
            StatementKind::CreateIndex => {
                if let Err(e) = apply_create_index(&mut report.tables, stmt) {
                    if strict {
                        return Err(anyhow!("statement {idx}: {e}"));
                    }
                    report.warnings.push(format!("statement {idx} skipped: {e}"));
                }
            }
            StatementKind::Insert | StatementKind::Other => {}
        }
    }
    Ok(report)
}

fn parse_create_table(stmt: &str) -> Result<Table> {
    let has_autoincrement = autoincrement_re().is_match(stmt);
    let upper = stmt.to_ascii_uppercase();
    let name_start = upper
        .find("TABLE")
        .ok_or_else(|| anyhow!("not a CREATE TABLE statement"))?
        + "TABLE".len();
    let open = stmt[name_start..]
        .find('(')
        .ok_or_else(|| anyhow!("missing column list"))?;
    let name_part = stmt[name_start..name_start + open].trim();
    let (_, table_name) = parse_table_ref(name_part);

    let chars: Vec<char> = stmt.chars().collect();
    let open_idx = stmt[..name_start + open].chars().count();
    let close_idx = find_matching_paren(&chars, open_idx)
        .ok_or_else(|| anyhow!("unbalanced parentheses in CREATE TABLE"))?;
    let body: String = chars[open_idx + 1..close_idx].iter().collect();

    let mut table = Table::new(table_name);
    let mut constraint_seq = 0usize;
    for item in split_top_level_commas(&body) {
        apply_table_item(&mut table, &item, &mut constraint_seq, |item| {
            parse_column_definition(item, has_autoincrement)
        });
    }

    let tail: String = chars[close_idx + 1..].iter().collect();
    let tail_upper = tail.to_ascii_uppercase();
    table.options.without_rowid = tail_upper.contains("WITHOUT ROWID");
    table.options.strict = tail_upper.contains("STRICT");

    Ok(table)
}

fn parse_column_definition(item: &str, table_has_autoincrement: bool) -> Option<(Column, Vec<crate::domain::schema::Constraint>)> {
    let mut tokens = tokenize(item);
    if tokens.is_empty() {
        return None;
    }
    let name = unquote_identifier(&tokens.remove(0));
    let type_tok = tokens.first().cloned().unwrap_or_default();
    let logical_type = map_base_type(&type_tok);
    if !type_tok.is_empty() {
        tokens.remove(0);
    }

    let mut column = Column::new(name, logical_type.clone());
    let rest = tokens.join(" ");
    let rest_upper = rest.to_ascii_uppercase();

    let is_integer_pk = rest_upper.contains("PRIMARY KEY")
        && matches!(logical_type, LogicalType::Int | LogicalType::BigInt);
    column.auto_increment = table_has_autoincrement && is_integer_pk;
    column.nullable = !rest_upper.contains("NOT NULL") && !column.auto_increment;
    if rest_upper.contains("PRIMARY KEY") {
        column.nullable = false;
    }

    if let Some(default_expr) = extract_clause(&rest, "DEFAULT") {
        column.default = parse_default_expr(&default_expr);
    }

    Some((column, Vec::new()))
}

fn tokenize(item: &str) -> Vec<String> {
    let chars: Vec<char> = item.trim().chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            i += 1;
            continue;
        }
        if c == '(' {
            let close = find_matching_paren(&chars, i).unwrap_or(chars.len() - 1);
            current.extend(&chars[i..=close]);
            i = close + 1;
            continue;
        }
        if c == '\'' {
            let mut j = i + 1;
            while j < chars.len() {
                if chars[j] == '\'' {
                    if chars.get(j + 1) == Some(&'\'') {
                        j += 2;
                        continue;
                    }
                    break;
                }
                j += 1;
            }
            current.extend(&chars[i..=j.min(chars.len() - 1)]);
            i = j + 1;
            continue;
        }
        current.push(c);
        i += 1;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn extract_clause(rest: &str, keyword: &str) -> Option<String> {
    let upper = rest.to_ascii_uppercase();
    let pos = upper.find(keyword)?;
    let after = &rest[pos + keyword.len()..];
    let stop_words = [" NOT NULL", " NULL", " PRIMARY KEY", " UNIQUE", " DEFAULT", " COLLATE"];
    let after_upper = after.to_ascii_uppercase();
    let mut end = after.len();
    for w in stop_words {
        if let Some(p) = after_upper.find(w) {
            end = end.min(p);
        }
    }
    Some(after[..end].trim().to_string())
}

fn map_base_type(decl: &str) -> LogicalType {
    let upper = decl.to_ascii_uppercase();
    if upper.contains("INT") {
        LogicalType::Int
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        LogicalType::Text
    } else if upper.contains("BLOB") || upper.is_empty() {
        LogicalType::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        LogicalType::Double
    } else if upper.contains("BOOL") {
        LogicalType::Boolean
    } else if upper.contains("DATE") {
        LogicalType::Date
    } else {
        LogicalType::Other(decl.to_string())
    }
}

fn find_table_mut<'a>(tables: &'a mut [Table], name: &str) -> Option<&'a mut Table> {
    tables.iter_mut().find(|t| t.name.0 == name)
}

/// Returns `Ok(Some(advisory))` for clauses outside SQLite's narrow ALTER
/// surface, `Ok(None)` when the clause was applied, `Err` for a genuinely
/// malformed statement.
fn apply_alter_table(tables: &mut [Table], stmt: &str) -> Result<Option<String>> {
    let upper = stmt.to_ascii_uppercase();
    let after_alter = stmt["ALTER TABLE".len()..].trim_start();
    let after_alter_upper = &upper["ALTER TABLE".len()..].trim_start();

    let action_start = after_alter_upper
        .find("ADD")
        .or_else(|| after_alter_upper.find("RENAME"))
        .or_else(|| after_alter_upper.find("DROP"))
        .ok_or_else(|| anyhow!("unrecognized ALTER TABLE clause"))?;
    let table_name_part = after_alter[..action_start].trim();
    let (_, table_name) = parse_table_ref(table_name_part);

    let action = after_alter[action_start..].trim();
    let action_upper = action.to_ascii_uppercase();

    let Some(table) = find_table_mut(tables, &table_name) else {
        return Err(anyhow!("ALTER TABLE references unknown table {table_name}"));
    };

    if action_upper.starts_with("ADD COLUMN") || action_upper.starts_with("ADD ") {
        let col_def = if action_upper.starts_with("ADD COLUMN") {
            action["ADD COLUMN".len()..].trim()
        } else {
            action["ADD".len()..].trim()
        };
        if let Some((col, _)) = parse_column_definition(col_def, false) {
            table.columns.push(col);
        }
        return Ok(None);
    }
    if action_upper.starts_with("DROP COLUMN") || action_upper.starts_with("DROP ") {
        let col_name = action_upper
            .find("COLUMN")
            .map(|p| action[p + "COLUMN".len()..].trim())
            .unwrap_or_else(|| action["DROP".len()..].trim());
        let col_name = unquote_identifier(col_name);
        table.columns.retain(|c| c.name.0 != col_name);
        return Ok(None);
    }
    if action_upper.starts_with("RENAME COLUMN") {
        if let Some((from, to)) = parse_rename_pair(action, "RENAME COLUMN") {
            if let Some(col) = table.columns.iter_mut().find(|c| c.name.0 == from) {
                col.name = ColumnName(to);
            }
        }
        return Ok(None);
    }
    if action_upper.starts_with("RENAME TO") {
        let new_name = unquote_identifier(action["RENAME TO".len()..].trim());
        table.name = crate::domain::value_objects::TableName(new_name);
        return Ok(None);
    }

    Ok(Some(format!(
        "unsupported SQLite ALTER TABLE clause on {table_name}: `{action}` — consider an equivalent CREATE INDEX or a table-rebuild migration instead"
    )))
}

fn parse_rename_pair(action: &str, keyword: &str) -> Option<(String, String)> {
    let rest = action[keyword.len()..].trim();
    let upper = rest.to_ascii_uppercase();
    let to_pos = upper.find(" TO ")?;
    let from = unquote_identifier(rest[..to_pos].trim());
    let to = unquote_identifier(rest[to_pos + " TO ".len()..].trim());
    Some((from, to))
}

fn apply_create_index(tables: &mut [Table], stmt: &str) -> Result<()> {
    let upper = stmt.to_ascii_uppercase();
    let unique = upper.contains("UNIQUE");
    let on_pos = upper.find(" ON ").ok_or_else(|| anyhow!("CREATE INDEX missing ON clause"))?;
    let before_on = &stmt[..on_pos];
    let name_start = before_on.to_ascii_uppercase().find("INDEX").unwrap() + "INDEX".len();
    let index_name = unquote_identifier(before_on[name_start..].trim());

    let after_on = &stmt[on_pos + " ON ".len()..];
    let open = after_on.find('(').ok_or_else(|| anyhow!("CREATE INDEX missing column list"))?;
    let table_ref = after_on[..open].trim();
    let (_, table_name) = parse_table_ref(table_ref);

    let chars: Vec<char> = after_on.chars().collect();
    let open_idx = after_on[..open].chars().count();
    let close_idx =
        find_matching_paren(&chars, open_idx).ok_or_else(|| anyhow!("unbalanced index column list"))?;
    let col_list: String = chars[open_idx..=close_idx].iter().collect();
    let columns: Vec<IndexColumn> = parse_column_list(&col_list)
        .into_iter()
        .map(|c| IndexColumn {
            column: ColumnName(c.0),
            prefix_length: None,
            direction: SortDirection::Asc,
        })
        .collect();

    let Some(table) = find_table_mut(tables, &table_name) else {
        return Err(anyhow!("CREATE INDEX references unknown table {table_name}"));
    };
    table.indexes.push(Index {
        name: IndexName(index_name),
        index_type: if unique { IndexType::Unique } else { IndexType::Plain },
        columns,
        method: None,
        predicate: None,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_autoincrement_table() {
        let stmt = "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)";
        let report = parse_statements(&[stmt.to_string()], true).unwrap();
        assert!(report.tables[0].columns[0].auto_increment);
        assert!(!report.tables[0].columns[0].nullable);
    }

    #[test]
    fn without_rowid_and_strict_options_detected() {
        let stmt = "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT) STRICT, WITHOUT ROWID";
        let report = parse_statements(&[stmt.to_string()], true).unwrap();
        assert!(report.tables[0].options.strict);
        assert!(report.tables[0].options.without_rowid);
    }

    #[test]
    fn add_column_is_supported() {
        let stmts = vec![
            "CREATE TABLE t (id INTEGER PRIMARY KEY)".to_string(),
            "ALTER TABLE t ADD COLUMN name TEXT".to_string(),
        ];
        let report = parse_statements(&stmts, true).unwrap();
        assert_eq!(report.tables[0].columns.len(), 2);
    }

    #[test]
    fn unsupported_alter_clause_is_advisory_not_fatal() {
        let stmts = vec![
            "CREATE TABLE t (id INTEGER PRIMARY KEY, a INT)".to_string(),
            "ALTER TABLE t ALTER COLUMN a TYPE TEXT".to_string(),
        ];
        let report = parse_statements(&stmts, false).unwrap();
        assert_eq!(report.tables[0].columns.len(), 2);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("CREATE INDEX"));
    }

    #[test]
    fn rename_column_renames_in_place() {
        let stmts = vec![
            "CREATE TABLE t (id INTEGER PRIMARY KEY, old_name TEXT)".to_string(),
            "ALTER TABLE t RENAME COLUMN old_name TO new_name".to_string(),
        ];
        let report = parse_statements(&stmts, true).unwrap();
        assert!(report.tables[0].column("new_name").is_some());
        assert!(report.tables[0].column("old_name").is_none());
    }
}
