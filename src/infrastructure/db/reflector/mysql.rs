use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use std::collections::BTreeMap;

use super::{canonicalize_now_expression, get_opt_string, get_string, Reflector};
use crate::domain::schema::{
    Column, ColumnDefault, ColumnDialectOptions, Constraint, ConstraintKind, ForeignKeyDef, Index,
    IndexColumn, IndexType, LogicalType, MatchMode, ReferentialAction, SortDirection, Table,
    TableOptions, Trigger,
};
use crate::domain::value_objects::{ColumnName, ConstraintName, IndexName, TableName};

pub struct MysqlReflector;

#[async_trait]
impl Reflector for MysqlReflector {
    async fn reflect(&self, pool: &AnyPool) -> Result<Vec<Table>> {
        let table_names = fetch_table_names(pool).await?;
        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let mut table = Table::new(name.clone());
            table.columns = fetch_columns(pool, &name).await?;
            table.constraints = fetch_constraints(pool, &name).await?;
            table.indexes = fetch_indexes(pool, &name).await?;
            table.options = fetch_table_options(pool, &name).await?;
            table.triggers = fetch_triggers(pool, &name).await?;
            tables.push(table);
        }
        Ok(tables)
    }
}

async fn fetch_table_names(pool: &AnyPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .context("failed to enumerate information_schema.tables")?;
    rows.iter().map(|r| get_string(r, 0)).collect()
}

async fn fetch_table_options(pool: &AnyPool, table: &str) -> Result<TableOptions> {
    let row = sqlx::query(
        "SELECT engine, table_collation, auto_increment, table_comment \
         FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to fetch table options for {table}"))?;

    Ok(TableOptions {
        engine: get_opt_string(&row, 0)?,
        charset: None,
        collation: get_opt_string(&row, 1)?,
        tablespace: None,
        without_rowid: false,
        strict: false,
        comment: get_opt_string(&row, 3)?.filter(|c| !c.is_empty()),
        auto_increment_start: row.try_get::<Option<i64>, _>(2).ok().flatten().map(|v| v as u64),
    })
}

async fn fetch_columns(pool: &AnyPool, table: &str) -> Result<Vec<Column>> {
    let rows = sqlx::query(
        "SELECT column_name, data_type, is_nullable, column_default, extra, \
                character_maximum_length, numeric_precision, numeric_scale, \
                column_type, character_set_name, collation_name, column_comment \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? \
         ORDER BY ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch columns for {table}"))?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = get_string(row, 0)?;
        let data_type = get_string(row, 1)?;
        let nullable = get_string(row, 2)? == "YES";
        let default_raw = get_opt_string(row, 3)?;
        let extra = get_string(row, 4)?.to_ascii_lowercase();
        let max_len: Option<i64> = row.try_get(5).ok();
        let precision: Option<i64> = row.try_get(6).ok();
        let scale: Option<i64> = row.try_get(7).ok();
        let column_type = get_string(row, 8)?;
        let charset = get_opt_string(row, 9)?;
        let collation = get_opt_string(row, 10)?;
        let comment = get_opt_string(row, 11)?.filter(|c| !c.is_empty());

        let enum_members = parse_enum_members(&column_type);
        let logical_type = if let Some(members) = enum_members {
            LogicalType::Enum(members)
        } else {
            map_mysql_type(&data_type, max_len, precision, scale)
        };

        let auto_increment = extra.contains("auto_increment");
        let default = match default_raw {
            None => ColumnDefault::Absent,
            Some(d) => ColumnDefault::Expression(canonicalize_now_expression(&d)),
        };

        columns.push(Column {
            name: ColumnName(name),
            logical_type,
            nullable,
            default,
            auto_increment,
            comment,
            options: ColumnDialectOptions {
                unsigned: column_type.contains("unsigned"),
                zerofill: column_type.contains("zerofill"),
                charset,
                collation,
                on_update: extra
                    .contains("on update current_timestamp")
                    .then(|| "CURRENT_TIMESTAMP".to_string()),
            },
        });
    }
    Ok(columns)
}

fn parse_enum_members(column_type: &str) -> Option<Vec<String>> {
    let inner = column_type.strip_prefix("enum(")?.strip_suffix(')')?;
    Some(
        inner
            .split(',')
            .map(|m| m.trim().trim_matches('\'').replace("''", "'"))
            .collect(),
    )
}

fn map_mysql_type(
    data_type: &str,
    max_len: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> LogicalType {
    match data_type {
        "tinyint" => LogicalType::TinyInt,
        "smallint" => LogicalType::SmallInt,
        "mediumint" | "int" | "integer" => LogicalType::Int,
        "bigint" => LogicalType::BigInt,
        "decimal" | "numeric" => LogicalType::Decimal {
            precision: precision.unwrap_or(10) as u32,
            scale: scale.unwrap_or(0) as u32,
        },
        "float" => LogicalType::Float,
        "double" => LogicalType::Double,
        "char" => LogicalType::Char(max_len.unwrap_or(1) as u32),
        "varchar" => LogicalType::Varchar(max_len.unwrap_or(255) as u32),
        "text" | "tinytext" | "mediumtext" | "longtext" => LogicalType::Text,
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            LogicalType::Blob
        }
        "date" => LogicalType::Date,
        "time" => LogicalType::Time,
        "datetime" => LogicalType::DateTime,
        "timestamp" => LogicalType::Timestamp,
        "json" => LogicalType::Json,
        other => LogicalType::Other(other.to_string()),
    }
}

async fn fetch_constraints(pool: &AnyPool, table: &str) -> Result<Vec<Constraint>> {
    let rows = sqlx::query(
        "SELECT tc.constraint_name, tc.constraint_type, kcu.column_name, \
                kcu.ordinal_position, kcu.referenced_table_name, kcu.referenced_column_name, \
                rc.update_rule, rc.delete_rule \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
         LEFT JOIN information_schema.referential_constraints rc \
           ON tc.constraint_name = rc.constraint_name AND tc.table_schema = rc.constraint_schema \
         WHERE tc.table_schema = DATABASE() AND tc.table_name = ? \
         ORDER BY tc.constraint_name, kcu.ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch constraints for {table}"))?;

    struct Building {
        kind_hint: String,
        local_columns: Vec<String>,
        referenced_table: Option<String>,
        referenced_columns: Vec<String>,
        on_update: String,
        on_delete: String,
    }
    let mut grouped: BTreeMap<String, Building> = BTreeMap::new();
    for row in &rows {
        let name = get_string(row, 0)?;
        let kind_hint = get_string(row, 1)?;
        let local_col = get_string(row, 2)?;
        let ref_table = get_opt_string(row, 4)?;
        let ref_col = get_opt_string(row, 5)?;
        let on_update = get_opt_string(row, 6)?.unwrap_or_else(|| "NO ACTION".to_string());
        let on_delete = get_opt_string(row, 7)?.unwrap_or_else(|| "NO ACTION".to_string());

        let entry = grouped.entry(name).or_insert_with(|| Building {
            kind_hint,
            local_columns: Vec::new(),
            referenced_table: ref_table.clone(),
            referenced_columns: Vec::new(),
            on_update,
            on_delete,
        });
        entry.local_columns.push(local_col);
        if let Some(c) = ref_col {
            entry.referenced_columns.push(c);
        }
    }

    let mut constraints = Vec::new();
    for (name, b) in grouped {
        let kind = match b.kind_hint.as_str() {
            "PRIMARY KEY" => ConstraintKind::PrimaryKey {
                columns: b.local_columns.iter().map(|c| ColumnName(c.clone())).collect(),
            },
            "UNIQUE" => ConstraintKind::Unique {
                columns: b.local_columns.iter().map(|c| ColumnName(c.clone())).collect(),
            },
            "FOREIGN KEY" => ConstraintKind::ForeignKey(ForeignKeyDef {
                local_columns: b.local_columns.iter().map(|c| ColumnName(c.clone())).collect(),
                referenced_table: TableName(b.referenced_table.unwrap_or_default()),
                referenced_schema: None,
                referenced_columns: b
                    .referenced_columns
                    .iter()
                    .map(|c| ColumnName(c.clone()))
                    .collect(),
                on_update: map_referential_action(&b.on_update),
                on_delete: map_referential_action(&b.on_delete),
                match_mode: MatchMode::Simple,
                deferrable: false,
            }),
            _ => continue,
        };
        constraints.push(Constraint {
            name: ConstraintName(name),
            kind,
        });
    }
    Ok(constraints)
}

fn map_referential_action(rule: &str) -> ReferentialAction {
    match rule {
        "CASCADE" => ReferentialAction::Cascade,
        "SET NULL" => ReferentialAction::SetNull,
        "SET DEFAULT" => ReferentialAction::SetDefault,
        "RESTRICT" => ReferentialAction::Restrict,
        _ => ReferentialAction::NoAction,
    }
}

async fn fetch_indexes(pool: &AnyPool, table: &str) -> Result<Vec<Index>> {
    let rows = sqlx::query(
        "SELECT index_name, column_name, non_unique, seq_in_index, collation \
         FROM information_schema.statistics \
         WHERE table_schema = DATABASE() AND table_name = ? \
         ORDER BY index_name, seq_in_index",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch indexes for {table}"))?;

    struct Building {
        unique: bool,
        columns: Vec<(String, SortDirection)>,
    }
    let mut grouped: BTreeMap<String, Building> = BTreeMap::new();
    for row in &rows {
        let idx_name = get_string(row, 0)?;
        let col_name = get_string(row, 1)?;
        let non_unique: i64 = row.try_get::<i64, _>(2).unwrap_or_else(|_| {
            row.try_get::<i32, _>(2).unwrap_or(1) as i64
        });
        let collation = get_opt_string(row, 4)?;
        let direction = if collation.as_deref() == Some("D") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        let entry = grouped.entry(idx_name).or_insert_with(|| Building {
            unique: non_unique == 0,
            columns: Vec::new(),
        });
        entry.columns.push((col_name, direction));
    }

    let mut indexes = Vec::new();
    for (name, b) in grouped {
        let is_primary = name == "PRIMARY";
        indexes.push(Index {
            name: IndexName(name),
            index_type: if is_primary {
                IndexType::Primary
            } else if b.unique {
                IndexType::Unique
            } else {
                IndexType::Plain
            },
            columns: b
                .columns
                .into_iter()
                .map(|(c, dir)| IndexColumn {
                    column: ColumnName(c),
                    prefix_length: None,
                    direction: dir,
                })
                .collect(),
            method: None,
            predicate: None,
        });
    }
    Ok(indexes)
}

/// Trigger bodies, carried verbatim (§4.6 phase 6 re-wraps them in
/// `DELIMITER $$ ... $$ DELIMITER ;` framing, the body text itself is untouched).
async fn fetch_triggers(pool: &AnyPool, table: &str) -> Result<Vec<Trigger>> {
    let rows = sqlx::query(
        "SELECT trigger_name, action_statement, action_timing, event_manipulation \
         FROM information_schema.triggers \
         WHERE trigger_schema = DATABASE() AND event_object_table = ? \
         ORDER BY trigger_name",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch triggers for {table}"))?;

    let mut triggers = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = get_string(row, 0)?;
        let body = get_string(row, 1)?;
        let timing = get_string(row, 2)?;
        let event = get_string(row, 3)?;
        triggers.push(Trigger {
            definition: format!(
                "CREATE TRIGGER `{name}` {timing} {event} ON `{table}` FOR EACH ROW {body}"
            ),
            name,
            table: TableName(table.to_string()),
        });
    }
    Ok(triggers)
}
