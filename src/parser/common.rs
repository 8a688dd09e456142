//! Shared grammar used by all three dialect parsers: table-name extraction,
//! paren-matching, top-level comma splitting, and column/constraint
//! definition parsing (§4.3 `parseCreateTable` / `parseColumnDefinition`).

use crate::domain::schema::{
    Column, ColumnDefault, Constraint, ConstraintKind, ForeignKeyDef, LogicalType, MatchMode,
    ReferentialAction, Table,
};
use crate::domain::value_objects::{ColumnName, ConstraintName, TableName};

/// Find the index (byte offset is not used; char index) of the `)` that
/// matches the `(` at `open_idx`, honoring single/double-quoted strings and
/// backtick identifiers so a literal containing unbalanced parens doesn't
/// confuse the scan.
pub fn find_matching_paren(chars: &[char], open_idx: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = open_idx;
    let mut in_single = false;
    let mut in_double = false;
    let mut in_backtick = false;
    while i < chars.len() {
        let c = chars[i];
        if in_single {
            if c == '\'' {
                if chars.get(i + 1) == Some(&'\'') {
                    i += 2;
                    continue;
                }
                in_single = false;
            }
        } else if in_double {
            if c == '"' {
                if chars.get(i + 1) == Some(&'"') {
                    i += 2;
                    continue;
                }
                in_double = false;
            }
        } else if in_backtick {
            if c == '`' {
                in_backtick = false;
            }
        } else {
            match c {
                '\'' => in_single = true,
                '"' => in_double = true,
                '`' => in_backtick = true,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Split the text between the outer parens of a `CREATE TABLE (...)` body on
/// top-level commas (depth 0, outside any quoting).
pub fn split_top_level_commas(body: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut in_backtick = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_single {
            current.push(c);
            if c == '\'' {
                if chars.get(i + 1) == Some(&'\'') {
                    current.push('\'');
                    i += 2;
                    continue;
                }
                in_single = false;
            }
            i += 1;
            continue;
        }
        if in_double {
            current.push(c);
            if c == '"' {
                if chars.get(i + 1) == Some(&'"') {
                    current.push('"');
                    i += 2;
                    continue;
                }
                in_double = false;
            }
            i += 1;
            continue;
        }
        if in_backtick {
            current.push(c);
            if c == '`' {
                in_backtick = false;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' => {
                in_single = true;
                current.push(c);
            }
            '"' => {
                in_double = true;
                current.push(c);
            }
            '`' => {
                in_backtick = true;
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
        i += 1;
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

/// Strip one layer of a dialect's identifier quoting (`"x"`, `` `x` ``,
/// `[x]`) if present, undoubling doubled-quote escapes.
pub fn unquote_identifier(raw: &str) -> String {
    let s = raw.trim();
    if s.len() >= 2 {
        let first = s.chars().next().unwrap();
        let last = s.chars().last().unwrap();
        match (first, last) {
            ('"', '"') => return s[1..s.len() - 1].replace("\"\"", "\""),
            ('`', '`') => return s[1..s.len() - 1].replace("``", "`"),
            ('[', ']') => return s[1..s.len() - 1].to_string(),
            _ => {}
        }
    }
    s.to_string()
}

/// Extract `(schema, table)` from a possibly schema-qualified, possibly
/// quoted table reference such as `"public"."orders"`, `` `orders` ``,
/// `IF NOT EXISTS orders`.
pub fn parse_table_ref(raw: &str) -> (Option<String>, String) {
    let cleaned = raw
        .trim()
        .trim_start_matches("IF NOT EXISTS")
        .trim_start_matches("if not exists")
        .trim();
    let parts = split_qualified_identifier(cleaned);
    match parts.len() {
        1 => (None, unquote_identifier(&parts[0])),
        2 => (Some(unquote_identifier(&parts[0])), unquote_identifier(&parts[1])),
        _ => (None, unquote_identifier(cleaned)),
    }
}

/// Split a `schema.table` (or plain `table`) reference on a top-level `.`,
/// respecting quoting so a quoted identifier containing a literal `.` is
/// not mistaken for a qualifier separator.
fn split_qualified_identifier(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = in_quote {
            current.push(c);
            if c == q {
                in_quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '"' | '`' | '[' => {
                in_quote = Some(if c == '[' { ']' } else { c });
                current.push(c);
            }
            '.' => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
        i += 1;
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Leading-keyword classification of one top-level item inside a
/// `CREATE TABLE (...)` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Column,
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
    Index,
}

pub fn classify_item(item: &str) -> ItemKind {
    let upper = item.trim_start().to_ascii_uppercase();
    if upper.starts_with("CONSTRAINT") {
        return classify_constraint_body(&upper);
    }
    if upper.starts_with("PRIMARY KEY") {
        ItemKind::PrimaryKey
    } else if upper.starts_with("UNIQUE") {
        ItemKind::Unique
    } else if upper.starts_with("FOREIGN KEY") {
        ItemKind::ForeignKey
    } else if upper.starts_with("CHECK") {
        ItemKind::Check
    } else if upper.starts_with("KEY") || upper.starts_with("INDEX") {
        ItemKind::Index
    } else {
        ItemKind::Column
    }
}

fn classify_constraint_body(upper_item: &str) -> ItemKind {
    // Skip past "CONSTRAINT <name>" to classify the clause that follows.
    let rest = upper_item.trim_start_matches("CONSTRAINT").trim_start();
    let after_name = rest.splitn(2, char::is_whitespace).nth(1).unwrap_or("");
    if after_name.starts_with("PRIMARY KEY") {
        ItemKind::PrimaryKey
    } else if after_name.starts_with("UNIQUE") {
        ItemKind::Unique
    } else if after_name.starts_with("FOREIGN KEY") {
        ItemKind::ForeignKey
    } else if after_name.starts_with("CHECK") {
        ItemKind::Check
    } else {
        ItemKind::Column
    }
}

/// Pull the explicit constraint name out of a `CONSTRAINT <name> ...` prefix,
/// if present.
pub fn explicit_constraint_name(item: &str) -> Option<String> {
    let trimmed = item.trim_start();
    if !trimmed.to_ascii_uppercase().starts_with("CONSTRAINT") {
        return None;
    }
    let rest = trimmed["CONSTRAINT".len()..].trim_start();
    let name_end = rest.find(char::is_whitespace)?;
    Some(unquote_identifier(&rest[..name_end]))
}

/// Column names inside a parenthesized list, e.g. `(a, b, c)` -> `[a, b, c]`.
pub fn parse_column_list(paren_list: &str) -> Vec<ColumnName> {
    let inner = paren_list.trim().trim_start_matches('(').trim_end_matches(')');
    split_top_level_commas(inner)
        .into_iter()
        .map(|c| {
            let name = c.split_whitespace().next().unwrap_or(&c);
            ColumnName(unquote_identifier(name))
        })
        .collect()
}

pub fn map_referential_action(action: &str) -> ReferentialAction {
    match action.to_ascii_uppercase().as_str() {
        "CASCADE" => ReferentialAction::Cascade,
        "SET NULL" => ReferentialAction::SetNull,
        "SET DEFAULT" => ReferentialAction::SetDefault,
        "RESTRICT" => ReferentialAction::Restrict,
        _ => ReferentialAction::NoAction,
    }
}

/// Parse a `FOREIGN KEY (cols) REFERENCES tbl (cols) [ON DELETE x] [ON UPDATE y]`
/// clause (with or without a leading `CONSTRAINT name`) into a `Constraint`.
pub fn parse_foreign_key_clause(item: &str, synthesized_name: impl Into<String>) -> Option<Constraint> {
    let upper = item.to_ascii_uppercase();
    let fk_pos = upper.find("FOREIGN KEY")?;
    let after_fk = &item[fk_pos + "FOREIGN KEY".len()..];
    let local_open = after_fk.find('(')?;
    let local_chars: Vec<char> = after_fk.chars().collect();
    let local_open_idx = after_fk[..local_open].chars().count();
    let local_close_idx = find_matching_paren(&local_chars, local_open_idx)?;
    let local_cols_raw: String = local_chars[local_open_idx..=local_close_idx].iter().collect();
    let local_columns = parse_column_list(&local_cols_raw);

    let remainder: String = local_chars[local_close_idx + 1..].iter().collect();
    let remainder_upper = remainder.to_ascii_uppercase();
    let ref_pos = remainder_upper.find("REFERENCES")?;
    let after_ref = &remainder[ref_pos + "REFERENCES".len()..];
    let after_ref_trim = after_ref.trim_start();
    let ref_open_rel = after_ref_trim.find('(');
    let (ref_table_raw, after_table) = match ref_open_rel {
        Some(pos) => (after_ref_trim[..pos].trim(), &after_ref_trim[pos..]),
        None => (after_ref_trim.trim(), ""),
    };
    let (_, ref_table) = parse_table_ref(ref_table_raw);

    let after_table_chars: Vec<char> = after_table.chars().collect();
    let referenced_columns = if after_table_chars.first() == Some(&'(') {
        if let Some(close) = find_matching_paren(&after_table_chars, 0) {
            let raw: String = after_table_chars[0..=close].iter().collect();
            parse_column_list(&raw)
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };

    let tail_upper = after_table.to_ascii_uppercase();
    let on_delete = extract_on_action(&tail_upper, "ON DELETE");
    let on_update = extract_on_action(&tail_upper, "ON UPDATE");
    let deferrable = tail_upper.contains("DEFERRABLE") && !tail_upper.contains("NOT DEFERRABLE");

    Some(Constraint {
        name: ConstraintName(synthesized_name.into()),
        kind: ConstraintKind::ForeignKey(ForeignKeyDef {
            local_columns,
            referenced_table: TableName(ref_table),
            referenced_schema: None,
            referenced_columns,
            on_update: map_referential_action(&on_update),
            on_delete: map_referential_action(&on_delete),
            match_mode: MatchMode::Simple,
            deferrable,
        }),
    })
}

fn extract_on_action(tail_upper: &str, keyword: &str) -> String {
    let Some(pos) = tail_upper.find(keyword) else {
        return String::new();
    };
    let after = tail_upper[pos + keyword.len()..].trim_start();
    for action in ["CASCADE", "SET NULL", "SET DEFAULT", "RESTRICT", "NO ACTION"] {
        if after.starts_with(action) {
            return action.to_string();
        }
    }
    String::new()
}

/// Parse a `CHECK (...)` clause (with or without a leading `CONSTRAINT name`).
pub fn parse_check_clause(item: &str, synthesized_name: impl Into<String>) -> Option<Constraint> {
    let upper = item.to_ascii_uppercase();
    let check_pos = upper.find("CHECK")?;
    let after = &item[check_pos + "CHECK".len()..];
    let open_rel = after.find('(')?;
    let chars: Vec<char> = after.chars().collect();
    let open_idx = after[..open_rel].chars().count();
    let close_idx = find_matching_paren(&chars, open_idx)?;
    let expr: String = chars[open_idx + 1..close_idx].iter().collect();
    Some(Constraint {
        name: ConstraintName(synthesized_name.into()),
        kind: ConstraintKind::Check {
            expression: expr.trim().to_string(),
        },
    })
}

/// Strip a trailing `::type` Postgres cast and surrounding whitespace,
/// used when normalizing default-value expressions during parse.
pub fn strip_pg_cast(expr: &str) -> String {
    if let Some(idx) = expr.rfind("::") {
        expr[..idx].trim().to_string()
    } else {
        expr.trim().to_string()
    }
}

/// Parse a single `DEFAULT <expr>` token into a [`ColumnDefault`]. `expr` is
/// whatever follows the `DEFAULT` keyword up to the next modifier boundary.
pub fn parse_default_expr(expr: &str) -> ColumnDefault {
    let trimmed = expr.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return ColumnDefault::Null;
    }
    if trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2 {
        let unescaped = trimmed[1..trimmed.len() - 1].replace("''", "'");
        return ColumnDefault::Literal(serde_json::Value::String(unescaped));
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return ColumnDefault::Literal(serde_json::Value::from(n));
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(f) {
            return ColumnDefault::Literal(serde_json::Value::Number(num));
        }
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return ColumnDefault::Literal(serde_json::Value::Bool(true));
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return ColumnDefault::Literal(serde_json::Value::Bool(false));
    }
    ColumnDefault::Expression(trimmed.to_string())
}

/// Apply the parsed columns and synthesized constraints for one
/// `CREATE TABLE` body item onto `table`, routing by [`ItemKind`].
/// `column_parser` maps a raw column-definition item to a [`Column`] plus
/// any inline constraints it implies, in a dialect-specific way (type
/// grammar and modifier keywords differ per engine).
pub fn apply_table_item(
    table: &mut Table,
    item: &str,
    constraint_seq: &mut usize,
    column_parser: impl Fn(&str) -> Option<(Column, Vec<Constraint>)>,
) {
    match classify_item(item) {
        ItemKind::PrimaryKey => {
            if let Some(open) = item.find('(') {
                let chars: Vec<char> = item[open..].chars().collect();
                if let Some(close) = find_matching_paren(&chars, 0) {
                    let raw: String = chars[0..=close].iter().collect();
                    let columns = parse_column_list(&raw);
                    let name = explicit_constraint_name(item)
                        .unwrap_or_else(|| format!("{}_pkey", table.name.0));
                    table.constraints.push(Constraint {
                        name: ConstraintName(name),
                        kind: ConstraintKind::PrimaryKey { columns },
                    });
                }
            }
        }
        ItemKind::Unique => {
            if let Some(open) = item.find('(') {
                let chars: Vec<char> = item[open..].chars().collect();
                if let Some(close) = find_matching_paren(&chars, 0) {
                    let raw: String = chars[0..=close].iter().collect();
                    let columns = parse_column_list(&raw);
                    *constraint_seq += 1;
                    let name = explicit_constraint_name(item)
                        .unwrap_or_else(|| format!("{}_uq_{}", table.name.0, constraint_seq));
                    table.constraints.push(Constraint {
                        name: ConstraintName(name),
                        kind: ConstraintKind::Unique { columns },
                    });
                }
            }
        }
        ItemKind::ForeignKey => {
            *constraint_seq += 1;
            let name = explicit_constraint_name(item)
                .unwrap_or_else(|| format!("{}_fk_{}", table.name.0, constraint_seq));
            if let Some(c) = parse_foreign_key_clause(item, name) {
                table.constraints.push(c);
            }
        }
        ItemKind::Check => {
            *constraint_seq += 1;
            let name = explicit_constraint_name(item)
                .unwrap_or_else(|| format!("{}_chk_{}", table.name.0, constraint_seq));
            if let Some(c) = parse_check_clause(item, name) {
                table.constraints.push(c);
            }
        }
        ItemKind::Index => {
            // Inline `KEY`/`INDEX` clauses (MySQL) are deferred to the
            // index reflector's equivalent in the dialect-specific parser;
            // the common base only records columns, not index creation.
        }
        ItemKind::Column => {
            if let Some((col, extra_constraints)) = column_parser(item) {
                table.columns.push(col);
                table.constraints.extend(extra_constraints);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_matching_paren_skips_parens_inside_strings() {
        let s = "(a text default '(not a paren)', b int)";
        let chars: Vec<char> = s.chars().collect();
        let close = find_matching_paren(&chars, 0).unwrap();
        assert_eq!(chars[close], ')');
        assert_eq!(close, chars.len() - 1);
    }

    #[test]
    fn split_top_level_commas_ignores_nested_and_quoted_commas() {
        let body = "a int, b varchar(10) default 'x,y', CHECK (a > 0 AND b <> 'p,q')";
        let items = split_top_level_commas(body);
        assert_eq!(items.len(), 3);
        assert!(items[1].contains("'x,y'"));
    }

    #[test]
    fn parse_table_ref_handles_schema_qualification_and_quoting() {
        assert_eq!(
            parse_table_ref(r#""public"."orders""#),
            (Some("public".to_string()), "orders".to_string())
        );
        assert_eq!(parse_table_ref("`orders`"), (None, "orders".to_string()));
        assert_eq!(
            parse_table_ref("IF NOT EXISTS orders"),
            (None, "orders".to_string())
        );
    }

    #[test]
    fn classify_item_recognizes_constraint_clauses() {
        assert_eq!(classify_item("PRIMARY KEY (id)"), ItemKind::PrimaryKey);
        assert_eq!(classify_item("UNIQUE (email)"), ItemKind::Unique);
        assert_eq!(
            classify_item("FOREIGN KEY (customer_id) REFERENCES customers(id)"),
            ItemKind::ForeignKey
        );
        assert_eq!(classify_item("CHECK (amount > 0)"), ItemKind::Check);
        assert_eq!(
            classify_item("CONSTRAINT orders_fk FOREIGN KEY (customer_id) REFERENCES customers(id)"),
            ItemKind::ForeignKey
        );
        assert_eq!(classify_item("id INT NOT NULL"), ItemKind::Column);
    }

    #[test]
    fn parse_foreign_key_clause_extracts_all_fields() {
        let item = "FOREIGN KEY (customer_id) REFERENCES customers (id) ON DELETE CASCADE ON UPDATE RESTRICT";
        let c = parse_foreign_key_clause(item, "orders_fk_1").unwrap();
        match c.kind {
            ConstraintKind::ForeignKey(fk) => {
                assert_eq!(fk.local_columns, vec![ColumnName("customer_id".into())]);
                assert_eq!(fk.referenced_table.0, "customers");
                assert_eq!(fk.referenced_columns, vec![ColumnName("id".into())]);
                assert_eq!(fk.on_delete, ReferentialAction::Cascade);
                assert_eq!(fk.on_update, ReferentialAction::Restrict);
            }
            _ => panic!("expected foreign key"),
        }
    }

    #[test]
    fn parse_check_clause_extracts_expression() {
        let item = "CONSTRAINT orders_chk_1 CHECK (amount > 0)";
        let c = parse_check_clause(item, "orders_chk_1").unwrap();
        match c.kind {
            ConstraintKind::Check { expression } => assert_eq!(expression, "amount > 0"),
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn parse_default_expr_recognizes_scalar_kinds() {
        assert_eq!(parse_default_expr("NULL"), ColumnDefault::Null);
        assert_eq!(
            parse_default_expr("'it''s fine'"),
            ColumnDefault::Literal(serde_json::Value::String("it's fine".into()))
        );
        assert_eq!(
            parse_default_expr("42"),
            ColumnDefault::Literal(serde_json::Value::from(42))
        );
        assert_eq!(
            parse_default_expr("CURRENT_TIMESTAMP"),
            ColumnDefault::Expression("CURRENT_TIMESTAMP".into())
        );
    }
}
