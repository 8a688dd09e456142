use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use sqlx::{AnyPool, Row};
use std::sync::OnceLock;

use super::{canonicalize_now_expression, get_opt_string, get_string, Reflector};
use crate::domain::schema::{
    Column, ColumnDefault, Constraint, ConstraintKind, ForeignKeyDef, Index, IndexColumn,
    IndexType, LogicalType, MatchMode, ReferentialAction, SortDirection, Table, TableOptions,
    Trigger,
};
use crate::domain::value_objects::{ColumnName, ConstraintName, IndexName, TableName};

pub struct SqliteReflector;

/// Matches `INTEGER PRIMARY KEY AUTOINCREMENT` (case-insensitive, free
/// whitespace) in a table's original `CREATE TABLE` text — §4.2's regex-based
/// autoincrement detection, since SQLite exposes no `extra` column flag.
fn autoincrement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\bINTEGER\s+PRIMARY\s+KEY\s+AUTOINCREMENT\b").unwrap())
}

#[async_trait]
impl Reflector for SqliteReflector {
    async fn reflect(&self, pool: &AnyPool) -> Result<Vec<Table>> {
        let tables_meta = fetch_table_sql(pool).await?;
        let mut tables = Vec::with_capacity(tables_meta.len());
        for (name, create_sql) in tables_meta {
            let autoincrement = autoincrement_re().is_match(&create_sql);
            let mut table = Table::new(name.clone());
            let (columns, pk_index) = fetch_columns(pool, &name, autoincrement).await?;
            table.columns = columns;
            table.constraints = fetch_foreign_keys(pool, &name).await?;
            table.indexes = fetch_indexes(pool, &name).await?;
            if let Some(pk) = pk_index {
                table.indexes.push(pk);
            }
            table.options = TableOptions::default();
            table.triggers = fetch_triggers(pool, &name).await?;
            tables.push(table);
        }
        Ok(tables)
    }
}

/// `sqlite_master` entries for user tables, excluding SQLite's own internals.
async fn fetch_table_sql(pool: &AnyPool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("failed to enumerate sqlite_master")?;
    rows.iter()
        .map(|r| Ok((get_string(r, 0)?, get_opt_string(r, 1)?.unwrap_or_default())))
        .collect()
}

/// Reads `PRAGMA table_info` and returns both the column list and the
/// table's primary key index (if any), reconstructed from the `pk` ordinal
/// column so multi-column `PRIMARY KEY (a, b)` tables order correctly —
/// `pk` is 1-based position within the key, not just a boolean flag.
async fn fetch_columns(
    pool: &AnyPool,
    table: &str,
    table_has_autoincrement: bool,
) -> Result<(Vec<Column>, Option<Index>)> {
    let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to read table_info for {table}"))?;

    let mut columns = Vec::with_capacity(rows.len());
    let mut pk_columns: Vec<(i64, String)> = Vec::new();
    for row in &rows {
        // cid, name, type, notnull, dflt_value, pk
        let name = get_string(row, 1)?;
        let decl_type = get_string(row, 2)?;
        let not_null: i64 = row.try_get::<i64, _>(3).unwrap_or_else(|_| {
            row.try_get::<i32, _>(3).unwrap_or(0) as i64
        });
        let default_raw = get_opt_string(row, 4)?;
        let pk_position: i64 = row.try_get::<i64, _>(5).unwrap_or_else(|_| {
            row.try_get::<i32, _>(5).unwrap_or(0) as i64
        });

        let logical_type = map_sqlite_type(&decl_type);
        let is_integer_pk = pk_position > 0 && matches!(logical_type, LogicalType::Int | LogicalType::BigInt);
        let auto_increment = table_has_autoincrement && is_integer_pk;

        if pk_position > 0 {
            pk_columns.push((pk_position, name.clone()));
        }

        let default = match default_raw {
            None => ColumnDefault::Absent,
            Some(d) if d.eq_ignore_ascii_case("null") => ColumnDefault::Null,
            Some(d) => ColumnDefault::Expression(canonicalize_now_expression(&d)),
        };

        columns.push(Column {
            name: ColumnName(name),
            logical_type,
            nullable: not_null == 0 && !auto_increment,
            default,
            auto_increment,
            comment: None,
            options: Default::default(),
        });
    }

    let pk_index = if pk_columns.is_empty() {
        None
    } else {
        pk_columns.sort_by_key(|(position, _)| *position);
        Some(Index {
            name: IndexName("PRIMARY".to_string()),
            index_type: IndexType::Primary,
            columns: pk_columns
                .into_iter()
                .map(|(_, col)| IndexColumn {
                    column: ColumnName(col),
                    prefix_length: None,
                    direction: SortDirection::Asc,
                })
                .collect(),
            method: None,
            predicate: None,
        })
    };

    Ok((columns, pk_index))
}

fn map_sqlite_type(decl: &str) -> LogicalType {
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

async fn fetch_foreign_keys(pool: &AnyPool, table: &str) -> Result<Vec<Constraint>> {
    let sql = format!("PRAGMA foreign_key_list(\"{}\")", table.replace('"', "\"\""));
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to read foreign_key_list for {table}"))?;

    let mut constraints = Vec::with_capacity(rows.len());
    for (n, row) in rows.iter().enumerate() {
        // id, seq, table, from, to, on_update, on_delete, match
        let ref_table = get_string(row, 2)?;
        let from_col = get_string(row, 3)?;
        let to_col = get_string(row, 4)?;
        let on_update = get_string(row, 5)?;
        let on_delete = get_string(row, 6)?;

        constraints.push(Constraint {
            name: ConstraintName(format!("{table}_fk_{n}")),
            kind: ConstraintKind::ForeignKey(ForeignKeyDef {
                local_columns: vec![ColumnName(from_col)],
                referenced_table: TableName(ref_table),
                referenced_schema: None,
                referenced_columns: vec![ColumnName(to_col)],
                on_update: map_action(&on_update),
                on_delete: map_action(&on_delete),
                match_mode: MatchMode::Simple,
                deferrable: false,
            }),
        });
    }
    Ok(constraints)
}

fn map_action(action: &str) -> ReferentialAction {
    match action.to_ascii_uppercase().as_str() {
        "CASCADE" => ReferentialAction::Cascade,
        "SET NULL" => ReferentialAction::SetNull,
        "SET DEFAULT" => ReferentialAction::SetDefault,
        "RESTRICT" => ReferentialAction::Restrict,
        _ => ReferentialAction::NoAction,
    }
}

async fn fetch_indexes(pool: &AnyPool, table: &str) -> Result<Vec<Index>> {
    let list_sql = format!("PRAGMA index_list(\"{}\")", table.replace('"', "\"\""));
    let list_rows = sqlx::query(&list_sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to read index_list for {table}"))?;

    let mut indexes = Vec::new();
    for row in &list_rows {
        // seq, name, unique, origin, partial
        let idx_name = get_string(row, 1)?;
        if idx_name.starts_with("sqlite_autoindex_") {
            continue; // implicit indexes backing UNIQUE/PK constraints
        }
        let unique: i64 = row.try_get::<i64, _>(2).unwrap_or_else(|_| {
            row.try_get::<i32, _>(2).unwrap_or(0) as i64
        });

        let info_sql = format!("PRAGMA index_info(\"{}\")", idx_name.replace('"', "\"\""));
        let info_rows = sqlx::query(&info_sql)
            .fetch_all(pool)
            .await
            .with_context(|| format!("failed to read index_info for {idx_name}"))?;

        let columns = info_rows
            .iter()
            .map(|r| {
                Ok(IndexColumn {
                    column: ColumnName(get_string(r, 2)?),
                    prefix_length: None,
                    direction: SortDirection::Asc,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        indexes.push(Index {
            name: IndexName(idx_name),
            index_type: if unique != 0 { IndexType::Unique } else { IndexType::Plain },
            columns,
            method: None,
            predicate: None,
        });
    }
    Ok(indexes)
}

/// Trigger bodies, carried verbatim from `sqlite_master` (§4.6 phase 6 emits
/// SQLite trigger text unchanged).
async fn fetch_triggers(pool: &AnyPool, table: &str) -> Result<Vec<Trigger>> {
    let rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'trigger' AND tbl_name = ? AND sql IS NOT NULL \
         ORDER BY name",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch triggers for {table}"))?;

    rows.iter()
        .map(|row| {
            Ok(Trigger {
                name: get_string(row, 0)?,
                table: TableName(table.to_string()),
                definition: get_string(row, 1)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoincrement_regex_matches_scenario_2() {
        let sql = "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT)";
        assert!(autoincrement_re().is_match(sql));
    }

    #[test]
    fn autoincrement_regex_rejects_plain_integer_pk() {
        let sql = "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)";
        assert!(!autoincrement_re().is_match(sql));
    }

    #[test]
    fn map_sqlite_type_recognizes_common_affinities() {
        assert!(matches!(map_sqlite_type("INTEGER"), LogicalType::Int));
        assert!(matches!(map_sqlite_type("VARCHAR(255)"), LogicalType::Text));
        assert!(matches!(map_sqlite_type("REAL"), LogicalType::Double));
        assert!(matches!(map_sqlite_type(""), LogicalType::Blob));
    }
}
