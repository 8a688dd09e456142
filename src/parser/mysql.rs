//! MySQL dialect parser (§4.3). Requires two-pass parsing: every `CREATE
//! TABLE` is parsed first, then deferred `ALTER TABLE`/`CREATE INDEX`
//! statements are applied against the already-built tables — mysqldump
//! output emits indexes and foreign keys via `ALTER` after all `CREATE`s.

use anyhow::{anyhow, Result};

use super::common::{
    apply_table_item, find_matching_paren, parse_column_list, parse_default_expr,
    parse_table_ref, split_top_level_commas, unquote_identifier,
};
use super::{classify, ParseReport, StatementKind};
use crate::domain::schema::{
    Column, ColumnDialectOptions, Index, IndexColumn, IndexType, LogicalType, SortDirection, Table,
};
use crate::domain::value_objects::{ColumnName, IndexName};

pub fn parse_statements(statements: &[String], strict: bool) -> Result<ParseReport> {
    let mut report = ParseReport::default();
    let mut deferred = Vec::new();

    for (idx, stmt) in statements.iter().enumerate() {
        match classify(stmt) {
            StatementKind::CreateTable => match parse_create_table(stmt) {
                Ok(table) => report.tables.push(table),
                Err(e) if strict => return Err(anyhow!("statement {idx}: {e}")),
                Err(e) => report.warnings.push(format!("statement {idx} skipped: {e}")),
            },
            StatementKind::AlterTable | StatementKind::CreateIndex => deferred.push((idx, stmt)),
            StatementKind::Insert | StatementKind::Other => {}
        }
    }

    for (idx, stmt) in deferred {
        let result = match classify(stmt) {
            StatementKind::AlterTable => apply_alter_table(&mut report.tables, stmt),
            StatementKind::CreateIndex => apply_create_index(&mut report.tables, stmt),
            _ => unreachable!(),
        };
        if let Err(e) = result {
            if strict {
                return Err(anyhow!("statement {idx}: {e}"));
            }
            report.warnings.push(format!("statement {idx} skipped: {e}"));
        }
    }

    Ok(report)
}

fn parse_create_table(stmt: &str) -> Result<Table> {
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
        let item_upper = item.trim_start().to_ascii_uppercase();
        if item_upper.starts_with("KEY") || item_upper.starts_with("INDEX") {
            if let Some(idx) = parse_inline_key(&item) {
                table.indexes.push(idx);
            }
            continue;
        }
        apply_table_item(&mut table, &item, &mut constraint_seq, parse_column_definition);
    }

    // Table options after the closing paren: ENGINE, DEFAULT CHARSET,
    // COLLATE, AUTO_INCREMENT, COMMENT.
    let tail: String = chars[close_idx + 1..].iter().collect();
    apply_table_options(&mut table, &tail);

    Ok(table)
}

fn parse_inline_key(item: &str) -> Option<Index> {
    let upper = item.to_ascii_uppercase();
    let open = item.find('(')?;
    let chars: Vec<char> = item.chars().collect();
    let open_idx = item[..open].chars().count();
    let close_idx = find_matching_paren(&chars, open_idx)?;
    let raw: String = chars[open_idx..=close_idx].iter().collect();
    let columns: Vec<IndexColumn> = parse_column_list(&raw)
        .into_iter()
        .map(|c| IndexColumn {
            column: ColumnName(c.0),
            prefix_length: None,
            direction: SortDirection::Asc,
        })
        .collect();

    let before_paren = item[..open].trim();
    let name = before_paren
        .split_whitespace()
        .nth(1)
        .map(unquote_identifier)
        .unwrap_or_else(|| format!("idx_{}", columns.first().map(|c| c.column.0.clone()).unwrap_or_default()));

    let index_type = if upper.starts_with("FULLTEXT") {
        IndexType::Fulltext
    } else if upper.starts_with("SPATIAL") {
        IndexType::Spatial
    } else {
        IndexType::Plain
    };

    Some(Index {
        name: IndexName(name),
        index_type,
        columns,
        method: None,
        predicate: None,
    })
}

fn apply_table_options(table: &mut Table, tail: &str) {
    let upper = tail.to_ascii_uppercase();
    table.options.engine = extract_option(&upper, tail, "ENGINE=");
    table.options.charset = extract_option(&upper, tail, "DEFAULT CHARSET=")
        .or_else(|| extract_option(&upper, tail, "CHARSET="));
    table.options.collation = extract_option(&upper, tail, "COLLATE=");
    if let Some(v) = extract_option(&upper, tail, "AUTO_INCREMENT=") {
        table.options.auto_increment_start = v.parse().ok();
    }
    if let Some(pos) = upper.find("COMMENT=") {
        let after = &tail[pos + "COMMENT=".len()..];
        table.options.comment = Some(unquote_string_literal(after.trim()));
    }
}

fn extract_option(upper: &str, original: &str, key: &str) -> Option<String> {
    let pos = upper.find(key)?;
    let after = &original[pos + key.len()..];
    let value: String = after
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect();
    Some(value.trim_matches('\'').trim_matches('"').to_string())
}

fn unquote_string_literal(s: &str) -> String {
    let s = s.trim().trim_end_matches(';');
    if s.starts_with('\'') {
        let end = s[1..].find('\'').map(|p| p + 1).unwrap_or(s.len());
        s[1..end].to_string()
    } else {
        s.to_string()
    }
}

fn parse_column_definition(item: &str) -> Option<(Column, Vec<crate::domain::schema::Constraint>)> {
    let mut tokens = tokenize(item);
    if tokens.is_empty() {
        return None;
    }
    let name = unquote_identifier(&tokens.remove(0));
    let type_tok = tokens.first()?.clone();
    let (logical_type, unsigned, zerofill) = parse_type(&type_tok);
    tokens.remove(0);

    let mut column = Column::new(name, logical_type);
    column.options = ColumnDialectOptions {
        unsigned,
        zerofill,
        ..Default::default()
    };

    let rest = tokens.join(" ");
    let rest_upper = rest.to_ascii_uppercase();

    column.nullable = !rest_upper.contains("NOT NULL");
    if rest_upper.contains("AUTO_INCREMENT") {
        column.auto_increment = true;
        column.nullable = false;
    }
    if rest_upper.contains("PRIMARY KEY") {
        column.nullable = false;
    }
    if let Some(default_expr) = extract_clause(&rest, "DEFAULT") {
        column.default = parse_default_expr(&default_expr);
    }
    if let Some(on_update) = extract_clause(&rest, "ON UPDATE") {
        column.options.on_update = Some(on_update);
    }
    if let Some(comment) = extract_clause(&rest, "COMMENT") {
        column.comment = Some(comment.trim_matches('\'').to_string());
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
                if chars[j] == '\\' {
                    j += 2;
                    continue;
                }
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
        if c == '`' {
            let mut j = i + 1;
            while j < chars.len() && chars[j] != '`' {
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
    let stop_words = [
        " NOT NULL", " NULL", " PRIMARY KEY", " UNIQUE", " AUTO_INCREMENT", " COMMENT",
        " ON UPDATE", " DEFAULT", " COLLATE", " CHARACTER SET",
    ];
    let after_upper = after.to_ascii_uppercase();
    let mut end = after.len();
    for w in stop_words {
        if let Some(p) = after_upper.find(w) {
            end = end.min(p);
        }
    }
    Some(after[..end].trim().to_string())
}

fn parse_type(type_tok: &str) -> (LogicalType, bool, bool) {
    let upper = type_tok.to_ascii_uppercase();
    let unsigned = upper.contains("UNSIGNED");
    let zerofill = upper.contains("ZEROFILL");
    let (base, params) = split_type_params(&upper);
    let logical = map_base_type(&base, &params, &upper);
    (logical, unsigned, zerofill)
}

fn split_type_params(upper: &str) -> (String, Vec<String>) {
    if let Some(open) = upper.find('(') {
        if let Some(close) = upper.rfind(')') {
            let base = upper[..open].trim().to_string();
            let params: Vec<String> = upper[open + 1..close]
                .split(',')
                .map(|p| p.trim().trim_matches('\'').to_string())
                .collect();
            return (base, params);
        }
    }
    (upper.trim().to_string(), Vec::new())
}

fn map_base_type(base: &str, params: &[String], full_upper: &str) -> LogicalType {
    let as_u32 = |i: usize| params.get(i).and_then(|p| p.parse::<u32>().ok());
    match base {
        "TINYINT" if full_upper.starts_with("TINYINT(1)") => LogicalType::Boolean,
        "TINYINT" => LogicalType::TinyInt,
        "SMALLINT" => LogicalType::SmallInt,
        "MEDIUMINT" | "INT" | "INTEGER" => LogicalType::Int,
        "BIGINT" => LogicalType::BigInt,
        "DECIMAL" | "NUMERIC" => LogicalType::Decimal {
            precision: as_u32(0).unwrap_or(10),
            scale: as_u32(1).unwrap_or(0),
        },
        "FLOAT" => LogicalType::Float,
        "DOUBLE" => LogicalType::Double,
        "BOOL" | "BOOLEAN" => LogicalType::Boolean,
        "CHAR" => LogicalType::Char(as_u32(0).unwrap_or(1)),
        "VARCHAR" => LogicalType::Varchar(as_u32(0).unwrap_or(255)),
        "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => LogicalType::Text,
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => LogicalType::Blob,
        "DATE" => LogicalType::Date,
        "TIME" => LogicalType::Time,
        "DATETIME" => LogicalType::DateTime,
        "TIMESTAMP" => LogicalType::Timestamp,
        "JSON" => LogicalType::Json,
        "ENUM" => LogicalType::Enum(params.to_vec()),
        other => LogicalType::Other(other.to_ascii_lowercase()),
    }
}

fn find_table_mut<'a>(tables: &'a mut [Table], name: &str) -> Option<&'a mut Table> {
    tables.iter_mut().find(|t| t.name.0 == name)
}

fn apply_alter_table(tables: &mut [Table], stmt: &str) -> Result<()> {
    let after_alter = stmt["ALTER TABLE".len()..].trim_start();
    let upper = after_alter.to_ascii_uppercase();
    let action_start = ["ADD", "DROP", "MODIFY", "CHANGE", "RENAME"]
        .iter()
        .filter_map(|kw| upper.find(kw))
        .min()
        .ok_or_else(|| anyhow!("unrecognized ALTER TABLE clause"))?;
    let table_name_part = after_alter[..action_start].trim();
    let (_, table_name) = parse_table_ref(table_name_part);

    let Some(table) = find_table_mut(tables, &table_name) else {
        return Err(anyhow!("ALTER TABLE references unknown table {table_name}"));
    };

    let action = after_alter[action_start..].trim();
    let action_upper = action.to_ascii_uppercase();

    if action_upper.starts_with("ADD CONSTRAINT") || action_upper.contains("FOREIGN KEY") {
        let mut constraint_seq = table.constraints.len();
        apply_table_item(table, action.trim_start_matches("ADD").trim(), &mut constraint_seq, |_| None);
        return Ok(());
    }
    if action_upper.starts_with("ADD INDEX") || action_upper.starts_with("ADD KEY") {
        if let Some(idx) = parse_inline_key(action.trim_start_matches("ADD").trim()) {
            table.indexes.push(idx);
        }
        return Ok(());
    }
    if action_upper.starts_with("ADD COLUMN") || action_upper.starts_with("ADD ") {
        let col_def = if action_upper.starts_with("ADD COLUMN") {
            action["ADD COLUMN".len()..].trim()
        } else {
            action["ADD".len()..].trim()
        };
        if let Some((col, extra)) = parse_column_definition(col_def) {
            table.columns.push(col);
            table.constraints.extend(extra);
        }
        return Ok(());
    }
    // DROP/MODIFY/CHANGE/RENAME: no-ops against the in-memory model, same
    // rationale as the Postgres parser.
    Ok(())
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
    fn parses_create_table_with_autoincrement_and_options() {
        let stmt = "CREATE TABLE `orders` (`id` INT UNSIGNED NOT NULL AUTO_INCREMENT, `total` DECIMAL(10,2) DEFAULT '0.00', PRIMARY KEY (`id`)) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 AUTO_INCREMENT=100";
        let report = parse_statements(&[stmt.to_string()], true).unwrap();
        let t = &report.tables[0];
        assert_eq!(t.name.0, "orders");
        assert!(t.columns[0].auto_increment);
        assert!(t.columns[0].options.unsigned);
        assert_eq!(t.options.engine.as_deref(), Some("InnoDB"));
        assert_eq!(t.options.auto_increment_start, Some(100));
    }

    #[test]
    fn enum_type_lists_members() {
        let stmt = "CREATE TABLE t (status ENUM('new','paid','shipped') NOT NULL)";
        let report = parse_statements(&[stmt.to_string()], true).unwrap();
        match &report.tables[0].columns[0].logical_type {
            LogicalType::Enum(members) => assert_eq!(members, &vec!["new", "paid", "shipped"]),
            other => panic!("expected enum, got {other:?}"),
        }
    }

    /// §8 scenario 1: a forward-referencing FK added via deferred ALTER
    /// after all CREATE TABLEs, as mysqldump emits it, resolves correctly
    /// under the two-pass parser regardless of statement order.
    #[test]
    fn two_pass_parsing_resolves_forward_referenced_alter() {
        let stmts = vec![
            "CREATE TABLE orders (id INT PRIMARY KEY, customer_id INT)".to_string(),
            "CREATE TABLE customers (id INT PRIMARY KEY)".to_string(),
            "ALTER TABLE orders ADD CONSTRAINT orders_fk_customer FOREIGN KEY (customer_id) REFERENCES customers (id)".to_string(),
        ];
        let report = parse_statements(&stmts, true).unwrap();
        let orders = report.tables.iter().find(|t| t.name.0 == "orders").unwrap();
        assert_eq!(orders.foreign_keys().count(), 1);
    }

    #[test]
    fn deferred_index_via_alter_table_add_index() {
        let stmts = vec![
            "CREATE TABLE t (id INT, name VARCHAR(50))".to_string(),
            "ALTER TABLE t ADD INDEX t_name_idx (name)".to_string(),
        ];
        let report = parse_statements(&stmts, true).unwrap();
        assert_eq!(report.tables[0].indexes.len(), 1);
    }
}
