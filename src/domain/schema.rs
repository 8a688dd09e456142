//! In-memory schema model: Table, Column, Index, Constraint.
//!
//! Populated either by a [`crate::infrastructure::db::reflector`] (from a live
//! connection) or by [`crate::parser`] (from a SQL script). Both producers
//! target this same model, which is what lets restore and cross-engine
//! analysis share one representation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::value_objects::{ColumnName, ConstraintName, IndexName, TableName};

/// Dialect-neutral logical column type with attached parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal { precision: u32, scale: u32 },
    Float,
    Double,
    Boolean,
    Char(u32),
    Varchar(u32),
    Text,
    Blob,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Uuid,
    /// Array-of-element-type, Postgres only.
    Array(Box<LogicalType>),
    Enum(Vec<String>),
    /// Unknown dialect-specific type string, carried through verbatim.
    /// Reflection never fails on an unmapped type; rendering does (`UnsupportedType`).
    Other(String),
}

/// One of: absent, explicit NULL, scalar literal, or a raw SQL expression token
/// (e.g. `CURRENT_TIMESTAMP`, `nextval('seq')`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDefault {
    Absent,
    Null,
    Literal(serde_json::Value),
    Expression(String),
}

impl ColumnDefault {
    pub fn is_absent(&self) -> bool {
        matches!(self, ColumnDefault::Absent)
    }
}

/// Dialect-specific column options that don't belong in the neutral core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnDialectOptions {
    pub unsigned: bool,
    pub zerofill: bool,
    pub charset: Option<String>,
    pub collation: Option<String>,
    /// MySQL `ON UPDATE <expr>` clause (e.g. `CURRENT_TIMESTAMP`).
    pub on_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: ColumnName,
    pub logical_type: LogicalType,
    pub nullable: bool,
    pub default: ColumnDefault,
    pub auto_increment: bool,
    pub comment: Option<String>,
    pub options: ColumnDialectOptions,
}

impl Column {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: ColumnName(name.into()),
            logical_type,
            nullable: true,
            default: ColumnDefault::Absent,
            auto_increment: false,
            comment: None,
            options: ColumnDialectOptions::default(),
        }
    }

    /// Invariant: an auto-increment column is non-nullable and of integer affinity.
    pub fn is_valid_autoincrement(&self) -> bool {
        if !self.auto_increment {
            return true;
        }
        !self.nullable
            && matches!(
                self.logical_type,
                LogicalType::TinyInt
                    | LogicalType::SmallInt
                    | LogicalType::Int
                    | LogicalType::BigInt
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    Primary,
    Unique,
    Plain,
    Fulltext,
    Spatial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub column: ColumnName,
    pub prefix_length: Option<u32>,
    pub direction: SortDirection,
}

impl IndexColumn {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: ColumnName(column.into()),
            prefix_length: None,
            direction: SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: IndexName,
    pub index_type: IndexType,
    pub columns: Vec<IndexColumn>,
    /// e.g. "btree", "hash", "gin".
    pub method: Option<String>,
    /// Partial-index predicate (Postgres), raw expression text.
    pub predicate: Option<String>,
}

impl Index {
    pub fn is_primary(&self) -> bool {
        self.index_type == IndexType::Primary || self.name.0 == "PRIMARY"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl Default for ReferentialAction {
    fn default() -> Self {
        ReferentialAction::NoAction
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    Simple,
    Full,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub local_columns: Vec<ColumnName>,
    pub referenced_table: TableName,
    pub referenced_schema: Option<String>,
    pub referenced_columns: Vec<ColumnName>,
    pub on_update: ReferentialAction,
    pub on_delete: ReferentialAction,
    pub match_mode: MatchMode,
    pub deferrable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey { columns: Vec<ColumnName> },
    Unique { columns: Vec<ColumnName> },
    ForeignKey(ForeignKeyDef),
    Check { expression: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: ConstraintName,
    pub kind: ConstraintKind,
}

impl Constraint {
    /// The table this constraint's FK references, if it is a foreign key.
    pub fn fk_target(&self) -> Option<&TableName> {
        match &self.kind {
            ConstraintKind::ForeignKey(fk) => Some(&fk.referenced_table),
            _ => None,
        }
    }
}

/// Engine-specific table-level options (engine, charset, collation, tablespace,
/// without-rowid, strict, comment, autoincrement start value).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOptions {
    pub engine: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
    pub tablespace: Option<String>,
    pub without_rowid: bool,
    pub strict: bool,
    pub comment: Option<String>,
    /// MySQL `AUTO_INCREMENT=<n>` start value, preserved on CREATE but not
    /// required for the target to honor at restore (see DESIGN.md).
    pub auto_increment_start: Option<u64>,
}

/// A trigger attached to a table, carried verbatim from reflection (§4.6
/// phase 6 re-emits `definition` as-is; only MySQL's DELIMITER framing is
/// added by the Orchestrator, the body text itself is never reparsed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub table: TableName,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: TableName,
    pub schema: Option<String>,
    pub columns: Vec<Column>,
    /// Insertion order preserved; keyed by index name for lookup.
    pub indexes: Vec<Index>,
    /// Insertion order preserved; keyed by constraint name for lookup.
    pub constraints: Vec<Constraint>,
    pub options: TableOptions,
    pub triggers: Vec<Trigger>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaInvariantError {
    #[error("duplicate column name `{0}` in table")]
    DuplicateColumn(String),
    #[error("table has more than one primary-key index")]
    MultiplePrimaryIndexes,
    #[error("auto-increment column `{0}` must be non-nullable integer-affinity")]
    InvalidAutoincrement(String),
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: TableName(name.into()),
            schema: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            constraints: Vec::new(),
            options: TableOptions::default(),
            triggers: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.0 == name)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name.0 == name)
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name.0 == name)
    }

    pub fn primary_key_index(&self) -> Option<&Index> {
        self.indexes.iter().find(|i| i.is_primary())
    }

    /// Foreign-key constraints on this table, in declaration order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::ForeignKey(_)))
    }

    /// Validate the invariants stated in §3 of the spec.
    pub fn validate(&self) -> Result<(), SchemaInvariantError> {
        let mut seen = BTreeMap::new();
        for col in &self.columns {
            if seen.insert(col.name.0.clone(), ()).is_some() {
                return Err(SchemaInvariantError::DuplicateColumn(col.name.0.clone()));
            }
            if !col.is_valid_autoincrement() {
                return Err(SchemaInvariantError::InvalidAutoincrement(
                    col.name.0.clone(),
                ));
            }
        }
        let pk_count = self.indexes.iter().filter(|i| i.is_primary()).count();
        if pk_count > 1 {
            return Err(SchemaInvariantError::MultiplePrimaryIndexes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_col(name: &str) -> Column {
        Column::new(name, LogicalType::Int)
    }

    #[test]
    fn duplicate_column_names_rejected() {
        let mut t = Table::new("users");
        t.columns.push(int_col("id"));
        t.columns.push(int_col("id"));
        assert_eq!(
            t.validate(),
            Err(SchemaInvariantError::DuplicateColumn("id".into()))
        );
    }

    #[test]
    fn autoincrement_must_be_non_nullable_integer() {
        let mut col = int_col("id");
        col.auto_increment = true;
        col.nullable = true;
        assert!(!col.is_valid_autoincrement());

        col.nullable = false;
        assert!(col.is_valid_autoincrement());

        col.logical_type = LogicalType::Varchar(32);
        assert!(!col.is_valid_autoincrement());
    }

    #[test]
    fn at_most_one_primary_index() {
        let mut t = Table::new("users");
        t.columns.push(int_col("id"));
        t.indexes.push(Index {
            name: IndexName("PRIMARY".into()),
            index_type: IndexType::Primary,
            columns: vec![IndexColumn::new("id")],
            method: None,
            predicate: None,
        });
        t.indexes.push(Index {
            name: IndexName("users_pk2".into()),
            index_type: IndexType::Primary,
            columns: vec![IndexColumn::new("id")],
            method: None,
            predicate: None,
        });
        assert_eq!(t.validate(), Err(SchemaInvariantError::MultiplePrimaryIndexes));
    }

    #[test]
    fn foreign_keys_iterates_only_fk_constraints() {
        let mut t = Table::new("orders");
        t.constraints.push(Constraint {
            name: ConstraintName("orders_pk".into()),
            kind: ConstraintKind::PrimaryKey {
                columns: vec![ColumnName("id".into())],
            },
        });
        t.constraints.push(Constraint {
            name: ConstraintName("orders_fk_customer".into()),
            kind: ConstraintKind::ForeignKey(ForeignKeyDef {
                local_columns: vec![ColumnName("customer_id".into())],
                referenced_table: TableName("customers".into()),
                referenced_schema: None,
                referenced_columns: vec![ColumnName("id".into())],
                on_update: ReferentialAction::NoAction,
                on_delete: ReferentialAction::Cascade,
                match_mode: MatchMode::Simple,
                deferrable: false,
            }),
        });
        assert_eq!(t.foreign_keys().count(), 1);
    }
}
