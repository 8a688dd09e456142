use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use std::collections::BTreeMap;

use super::{canonicalize_now_expression, get_opt_string, get_string, Reflector};
use crate::domain::schema::{
    Column, ColumnDefault, Constraint, ConstraintKind, ForeignKeyDef, Index, IndexColumn,
    IndexType, LogicalType, MatchMode, ReferentialAction, SortDirection, Table, TableOptions,
    Trigger,
};
use crate::domain::value_objects::{ColumnName, ConstraintName, IndexName, TableName};

pub struct PostgresReflector;

#[async_trait]
impl Reflector for PostgresReflector {
    async fn reflect(&self, pool: &AnyPool) -> Result<Vec<Table>> {
        let table_names = fetch_table_names(pool).await?;
        let mut tables = Vec::with_capacity(table_names.len());
        for name in table_names {
            let mut table = Table::new(name.clone());
            table.schema = Some("public".to_string());
            table.columns = fetch_columns(pool, &name).await?;
            table.constraints = fetch_constraints(pool, &name).await?;
            table.indexes = fetch_indexes(pool, &name).await?;
            table.options = TableOptions::default();
            table.triggers = fetch_triggers(pool, &name).await?;
            tables.push(table);
        }
        Ok(tables)
    }
}

async fn fetch_table_names(pool: &AnyPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT table_name::TEXT FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .context("failed to enumerate public.tables")?;
    rows.iter().map(|r| get_string(r, 0)).collect()
}

async fn fetch_columns(pool: &AnyPool, table: &str) -> Result<Vec<Column>> {
    let rows = sqlx::query(
        "SELECT column_name::TEXT, data_type::TEXT, is_nullable::TEXT, \
                column_default::TEXT, character_maximum_length, \
                numeric_precision, numeric_scale, udt_name::TEXT \
         FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 \
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
        let max_len: Option<i64> = row.try_get(4).ok();
        let precision: Option<i64> = row.try_get(5).ok();
        let scale: Option<i64> = row.try_get(6).ok();
        let udt_name = get_string(row, 7)?;

        let is_array = data_type == "ARRAY";
        let element_type = udt_name.strip_prefix('_').map(map_pg_type).unwrap_or(LogicalType::Text);
        let logical_type = if is_array {
            LogicalType::Array(Box::new(element_type))
        } else {
            map_pg_type_with_params(&data_type, max_len, precision, scale)
        };

        let auto_increment = default_raw
            .as_deref()
            .map(|d| d.contains("nextval("))
            .unwrap_or(false);

        let default = match default_raw {
            None => ColumnDefault::Absent,
            Some(d) if is_array => ColumnDefault::Expression(d), // retain verbatim (open question)
            Some(d) if d.contains("nextval(") => ColumnDefault::Absent, // rendered via SERIAL instead
            Some(d) => ColumnDefault::Expression(canonicalize_now_expression(&d)),
        };

        columns.push(Column {
            name: ColumnName(name),
            logical_type,
            nullable,
            default,
            auto_increment,
            comment: None,
            options: Default::default(),
        });
    }
    Ok(columns)
}

fn map_pg_type(udt: &str) -> LogicalType {
    map_pg_type_with_params(udt, None, None, None)
}

fn map_pg_type_with_params(
    data_type: &str,
    max_len: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> LogicalType {
    match data_type {
        "smallint" | "int2" => LogicalType::SmallInt,
        "integer" | "int4" | "int" => LogicalType::Int,
        "bigint" | "int8" => LogicalType::BigInt,
        "numeric" | "decimal" => LogicalType::Decimal {
            precision: precision.unwrap_or(10) as u32,
            scale: scale.unwrap_or(0) as u32,
        },
        "real" | "float4" => LogicalType::Float,
        "double precision" | "float8" => LogicalType::Double,
        "boolean" | "bool" => LogicalType::Boolean,
        "character" | "bpchar" => LogicalType::Char(max_len.unwrap_or(1) as u32),
        "character varying" | "varchar" => LogicalType::Varchar(max_len.unwrap_or(255) as u32),
        "text" => LogicalType::Text,
        "bytea" => LogicalType::Blob,
        "date" => LogicalType::Date,
        "time" | "time without time zone" => LogicalType::Time,
        "timestamp" | "timestamp without time zone" | "timestamp with time zone" => {
            LogicalType::Timestamp
        }
        "json" | "jsonb" => LogicalType::Json,
        "uuid" => LogicalType::Uuid,
        other => LogicalType::Other(other.to_string()),
    }
}

async fn fetch_constraints(pool: &AnyPool, table: &str) -> Result<Vec<Constraint>> {
    let rows = sqlx::query(
        "SELECT tc.constraint_name::TEXT, tc.constraint_type::TEXT, \
                kcu.column_name::TEXT, kcu.ordinal_position, \
                ccu.table_name::TEXT, ccu.column_name::TEXT, \
                rc.update_rule::TEXT, rc.delete_rule::TEXT, \
                cc.check_clause::TEXT \
         FROM information_schema.table_constraints tc \
         LEFT JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
         LEFT JOIN information_schema.constraint_column_usage ccu \
           ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema \
         LEFT JOIN information_schema.referential_constraints rc \
           ON tc.constraint_name = rc.constraint_name AND tc.table_schema = rc.constraint_schema \
         LEFT JOIN information_schema.check_constraints cc \
           ON tc.constraint_name = cc.constraint_name AND tc.table_schema = cc.constraint_schema \
         WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
         ORDER BY tc.constraint_name, kcu.ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch constraints for {table}"))?;

    // Group rows by constraint name; each row is one local/referenced column pair.
    struct Building {
        kind_hint: String,
        local_columns: Vec<String>,
        referenced_table: Option<String>,
        referenced_columns: Vec<String>,
        on_update: String,
        on_delete: String,
        check_clause: Option<String>,
    }
    let mut grouped: BTreeMap<String, Building> = BTreeMap::new();

    for row in &rows {
        let name = get_string(row, 0)?;
        let kind_hint = get_string(row, 1)?;
        let local_col = get_opt_string(row, 2)?;
        let ref_table = get_opt_string(row, 4)?;
        let ref_col = get_opt_string(row, 5)?;
        let on_update = get_opt_string(row, 6)?.unwrap_or_else(|| "NO ACTION".to_string());
        let on_delete = get_opt_string(row, 7)?.unwrap_or_else(|| "NO ACTION".to_string());
        let check_clause = get_opt_string(row, 8)?;

        let entry = grouped.entry(name).or_insert_with(|| Building {
            kind_hint: kind_hint.clone(),
            local_columns: Vec::new(),
            referenced_table: None,
            referenced_columns: Vec::new(),
            on_update,
            on_delete,
            check_clause: check_clause.clone(),
        });
        if let Some(c) = local_col {
            if !entry.local_columns.contains(&c) {
                entry.local_columns.push(c);
            }
        }
        if entry.referenced_table.is_none() {
            entry.referenced_table = ref_table;
        }
        if let Some(c) = ref_col {
            if !entry.referenced_columns.contains(&c) {
                entry.referenced_columns.push(c);
            }
        }
    }

    let mut constraints = Vec::new();
    for (name, b) in grouped {
        // Skip auto-generated NOT-NULL check shadows (§4.2 filter policy).
        if b.kind_hint == "CHECK" {
            let clause = b.check_clause.unwrap_or_default();
            if name.ends_with("_not_null") || clause.contains("IS NOT NULL") {
                continue;
            }
        }
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
                referenced_schema: Some("public".to_string()),
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
            "CHECK" => ConstraintKind::Check {
                expression: b.check_clause.unwrap_or_default(),
            },
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
    // Primary-key indexes are excluded — already captured as a constraint (§4.2).
    let rows = sqlx::query(
        "SELECT ic.relname::TEXT, a.attname::TEXT, ix.indisunique, am.amname::TEXT, ix.indisprimary \
         FROM pg_index ix \
         JOIN pg_class t ON t.oid = ix.indrelid \
         JOIN pg_class ic ON ic.oid = ix.indexrelid \
         JOIN pg_am am ON am.oid = ic.relam \
         JOIN unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
         JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
         WHERE t.relname = $1 AND t.relnamespace = 'public'::regnamespace \
         ORDER BY ic.relname, k.ord",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch indexes for {table}"))?;

    struct Building {
        unique: bool,
        method: String,
        primary: bool,
        columns: Vec<String>,
    }
    let mut grouped: BTreeMap<String, Building> = BTreeMap::new();
    for row in &rows {
        let idx_name = get_string(row, 0)?;
        let col_name = get_string(row, 1)?;
        let unique: bool = row.try_get(2).unwrap_or(false);
        let method = get_string(row, 3)?;
        let primary: bool = row.try_get(4).unwrap_or(false);
        let entry = grouped.entry(idx_name).or_insert_with(|| Building {
            unique,
            method,
            primary,
            columns: Vec::new(),
        });
        entry.columns.push(col_name);
    }

    let mut indexes = Vec::new();
    for (name, b) in grouped {
        indexes.push(Index {
            name: IndexName(if b.primary { "PRIMARY".to_string() } else { name }),
            index_type: if b.primary {
                IndexType::Primary
            } else if b.unique {
                IndexType::Unique
            } else {
                IndexType::Plain
            },
            columns: b
                .columns
                .iter()
                .map(|c| IndexColumn {
                    column: ColumnName(c.clone()),
                    prefix_length: None,
                    direction: SortDirection::Asc,
                })
                .collect(),
            method: Some(b.method),
            predicate: None,
        });
    }
    Ok(indexes)
}

/// Trigger bodies, carried verbatim via `pg_get_triggerdef` (§4.6 phase 6
/// re-emits Postgres trigger text unchanged, no reparsing).
async fn fetch_triggers(pool: &AnyPool, table: &str) -> Result<Vec<Trigger>> {
    let rows = sqlx::query(
        "SELECT t.tgname::TEXT, pg_get_triggerdef(t.oid)::TEXT \
         FROM pg_trigger t \
         JOIN pg_class c ON c.oid = t.tgrelid \
         WHERE c.relname = $1 AND NOT t.tgisinternal \
         ORDER BY t.tgname",
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
