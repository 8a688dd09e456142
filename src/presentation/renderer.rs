//! Renderer (§4.5): `Table` + `Platform` -> `CREATE TABLE` statement, plus
//! the deferred statements (indexes, cycle-deferred FKs, comments) the
//! Backup Orchestrator emits in later phases. Inline-vs-deferred policy:
//!
//! - Primary key: inline as a column attribute when the platform's
//!   autoincrement policy allows single-column inlining; otherwise a
//!   table-level `PRIMARY KEY (...)` clause.
//! - Unique/Check constraints: always inline.
//! - Foreign keys: inline unless the edge participates in a Sorter-reported
//!   cycle, in which case they are omitted here and re-emitted later as
//!   `ALTER TABLE ADD CONSTRAINT`.
//! - Non-unique indexes: always deferred.
//! - Comments: `COMMENT ON ...` (Postgres) or inline (MySQL); SQLite comments
//!   are inline directives only (SQLite has no catalog comment storage).

use crate::domain::error::EngineError;
use crate::domain::schema::{Column, ConstraintKind, Index, IndexType, Table};
use crate::domain::sorter::SortResult;
use crate::domain::value_objects::EngineKind;
use crate::infrastructure::db::dialect::{AutoincrementPolicy, Platform};

/// What the Renderer emitted inline for one table, so the Orchestrator knows
/// not to re-emit it in a later phase.
#[derive(Debug, Clone, Default)]
pub struct RenderedTable {
    pub create_statement: String,
    pub inline_constraint_names: Vec<String>,
    pub deferred_indexes: Vec<String>,
    pub deferred_constraints: Vec<String>,
    pub comment_statements: Vec<String>,
}

pub struct Renderer<'a> {
    platform: &'a dyn Platform,
}

impl<'a> Renderer<'a> {
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }

    pub fn render(&self, table: &Table, sort: &SortResult) -> Result<RenderedTable, EngineError> {
        let q = |s: &str| self.platform.quote_identifier(s);
        let qualified = match &table.schema {
            Some(schema) if !self.platform.schema_prefix(schema).is_empty() => {
                format!("{}{}", self.platform.schema_prefix(schema), q(&table.name.0))
            }
            _ => q(&table.name.0),
        };

        let single_col_pk_autoincrement = self.single_column_autoincrement_pk(table);

        let mut lines = Vec::new();
        let mut inline_constraint_names = Vec::new();

        for column in &table.columns {
            lines.push(self.render_column(column, single_col_pk_autoincrement.as_deref())?);
        }

        if single_col_pk_autoincrement.is_none() {
            if let Some(pk) = table.primary_key_index() {
                lines.push(self.render_table_level_pk(pk));
                inline_constraint_names.push(pk.name.0.clone());
            } else if let Some(pk_constraint) = table
                .constraints
                .iter()
                .find(|c| matches!(c.kind, ConstraintKind::PrimaryKey { .. }))
            {
                if let ConstraintKind::PrimaryKey { columns } = &pk_constraint.kind {
                    let cols = columns
                        .iter()
                        .map(|c| q(&c.0))
                        .collect::<Vec<_>>()
                        .join(", ");
                    lines.push(format!("PRIMARY KEY ({cols})"));
                    inline_constraint_names.push(pk_constraint.name.0.clone());
                }
            }
        }

        let mut deferred_constraints = Vec::new();
        for constraint in &table.constraints {
            match &constraint.kind {
                ConstraintKind::Unique { columns } => {
                    let cols = columns.iter().map(|c| q(&c.0)).collect::<Vec<_>>().join(", ");
                    lines.push(format!(
                        "CONSTRAINT {} UNIQUE ({cols})",
                        q(&constraint.name.0)
                    ));
                    inline_constraint_names.push(constraint.name.0.clone());
                }
                ConstraintKind::Check { expression } => {
                    if self.platform.feature_flags().supports_check_constraints {
                        lines.push(format!(
                            "CONSTRAINT {} CHECK ({expression})",
                            q(&constraint.name.0)
                        ));
                        inline_constraint_names.push(constraint.name.0.clone());
                    }
                }
                ConstraintKind::ForeignKey(fk) => {
                    // `is_cycle_edge` is symmetric for a 2-table cycle (both
                    // directions are reported), so only one side may be
                    // deferred or neither FK would ever be inlined. Defer the
                    // alphabetically-later table's FK, inline the other.
                    let cycle_edge = sort.is_cycle_edge(&table.name, &fk.referenced_table)
                        && table.name > fk.referenced_table;
                    if cycle_edge {
                        deferred_constraints.push(self.render_add_constraint_fk(table, constraint));
                    } else {
                        lines.push(self.render_inline_fk(constraint));
                        inline_constraint_names.push(constraint.name.0.clone());
                    }
                }
                ConstraintKind::PrimaryKey { .. } => {} // handled above
            }
        }

        let body = lines
            .into_iter()
            .map(|l| format!("  {l}"))
            .collect::<Vec<_>>()
            .join(",\n");

        let table_opts = self.render_table_options(table);
        let create_statement = format!("CREATE TABLE {qualified} (\n{body}\n){table_opts};");

        let deferred_indexes = table
            .indexes
            .iter()
            .filter(|i| i.index_type != IndexType::Primary)
            .map(|i| self.render_create_index(table, i))
            .collect();

        let comment_statements = self.render_comments(table);

        Ok(RenderedTable {
            create_statement,
            inline_constraint_names,
            deferred_indexes,
            deferred_constraints,
            comment_statements,
        })
    }

    /// When the platform inlines autoincrement PKs and the table has exactly
    /// one PK column that is itself `auto_increment`, return that column's
    /// name so `render_column` can fold `PRIMARY KEY` into the column clause
    /// instead of emitting a table-level clause.
    fn single_column_autoincrement_pk(&self, table: &Table) -> Option<String> {
        if self.platform.autoincrement_policy() != AutoincrementPolicy::InlineColumnAttribute {
            return None;
        }
        let pk = table.primary_key_index()?;
        if pk.columns.len() != 1 {
            return None;
        }
        let col_name = &pk.columns[0].column.0;
        let column = table.column(col_name)?;
        if column.auto_increment {
            Some(col_name.clone())
        } else {
            None
        }
    }

    fn render_column(&self, column: &Column, inline_pk_col: Option<&str>) -> Result<String, EngineError> {
        let q = |s: &str| self.platform.quote_identifier(s);
        let mut clause = format!("{} {}", q(&column.name.0), self.platform.render_type(column)?);

        if inline_pk_col == Some(column.name.0.as_str()) {
            clause.push_str(" PRIMARY KEY");
            if self.platform.engine_kind() == EngineKind::Sqlite {
                clause.push_str(" AUTOINCREMENT");
            } else if self.platform.engine_kind() == EngineKind::Mysql {
                clause.push_str(" AUTO_INCREMENT");
            }
        } else {
            if !column.nullable {
                clause.push_str(" NOT NULL");
            }
            if column.auto_increment && self.platform.engine_kind() == EngineKind::Mysql {
                clause.push_str(" AUTO_INCREMENT");
            }
        }

        if !column.default.is_absent() && inline_pk_col != Some(column.name.0.as_str()) {
            if let Some(lit) = self.render_default(&column.default, column) {
                clause.push_str(&format!(" DEFAULT {lit}"));
            }
        }

        if let Some(on_update) = &column.options.on_update {
            clause.push_str(&format!(" ON UPDATE {on_update}"));
        }

        if self.platform.engine_kind() == EngineKind::Mysql {
            if let Some(comment) = &column.comment {
                clause.push_str(&format!(" COMMENT '{}'", comment.replace('\'', "''")));
            }
        }

        Ok(clause)
    }

    fn render_default(
        &self,
        default: &crate::domain::schema::ColumnDefault,
        column: &Column,
    ) -> Option<String> {
        use crate::domain::schema::ColumnDefault;
        match default {
            ColumnDefault::Absent => None,
            ColumnDefault::Null => Some("NULL".to_string()),
            ColumnDefault::Expression(expr) => Some(expr.clone()),
            ColumnDefault::Literal(value) => Some(self.platform.quote_literal(value, &column.logical_type)),
        }
    }

    fn render_table_level_pk(&self, pk: &Index) -> String {
        let cols = pk
            .columns
            .iter()
            .map(|c| self.platform.quote_identifier(&c.column.0))
            .collect::<Vec<_>>()
            .join(", ");
        format!("PRIMARY KEY ({cols})")
    }

    fn render_inline_fk(&self, constraint: &crate::domain::schema::Constraint) -> String {
        let ConstraintKind::ForeignKey(fk) = &constraint.kind else {
            unreachable!()
        };
        let q = |s: &str| self.platform.quote_identifier(s);
        let local = fk.local_columns.iter().map(|c| q(&c.0)).collect::<Vec<_>>().join(", ");
        let referenced = fk.referenced_columns.iter().map(|c| q(&c.0)).collect::<Vec<_>>().join(", ");
        format!(
            "CONSTRAINT {} FOREIGN KEY ({local}) REFERENCES {} ({referenced}) ON DELETE {} ON UPDATE {}",
            q(&constraint.name.0),
            q(&fk.referenced_table.0),
            action_sql(fk.on_delete),
            action_sql(fk.on_update),
        )
    }

    fn render_add_constraint_fk(&self, table: &Table, constraint: &crate::domain::schema::Constraint) -> String {
        let q = |s: &str| self.platform.quote_identifier(s);
        format!(
            "ALTER TABLE {} ADD {};",
            q(&table.name.0),
            self.render_inline_fk(constraint)
        )
    }

    fn render_create_index(&self, table: &Table, index: &Index) -> String {
        let q = |s: &str| self.platform.quote_identifier(s);
        let cols = index
            .columns
            .iter()
            .map(|c| q(&c.column.0))
            .collect::<Vec<_>>()
            .join(", ");
        let unique = if index.index_type == IndexType::Unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {unique}INDEX {} ON {} ({cols});",
            q(&index.name.0),
            q(&table.name.0)
        )
    }

    fn render_table_options(&self, table: &Table) -> String {
        if self.platform.engine_kind() != EngineKind::Mysql {
            return String::new();
        }
        let mut opts = Vec::new();
        if let Some(engine) = &table.options.engine {
            opts.push(format!("ENGINE={engine}"));
        }
        if let Some(charset) = &table.options.charset {
            opts.push(format!("DEFAULT CHARSET={charset}"));
        }
        if opts.is_empty() {
            String::new()
        } else {
            format!(" {}", opts.join(" "))
        }
    }

    /// §4.5: comments are `COMMENT ON ...` statements on Postgres, inline
    /// column options on MySQL (already folded into `render_column`), and
    /// directive-only (no statement) on SQLite.
    fn render_comments(&self, table: &Table) -> Vec<String> {
        if self.platform.engine_kind() != EngineKind::Postgres {
            return Vec::new();
        }
        let q = |s: &str| self.platform.quote_identifier(s);
        let mut out = Vec::new();
        if let Some(comment) = &table.options.comment {
            out.push(format!(
                "COMMENT ON TABLE {} IS '{}';",
                q(&table.name.0),
                comment.replace('\'', "''")
            ));
        }
        for column in &table.columns {
            if let Some(comment) = &column.comment {
                out.push(format!(
                    "COMMENT ON COLUMN {}.{} IS '{}';",
                    q(&table.name.0),
                    q(&column.name.0),
                    comment.replace('\'', "''")
                ));
            }
        }
        out
    }
}

fn action_sql(action: crate::domain::schema::ReferentialAction) -> &'static str {
    use crate::domain::schema::ReferentialAction::*;
    match action {
        NoAction => "NO ACTION",
        Restrict => "RESTRICT",
        Cascade => "CASCADE",
        SetNull => "SET NULL",
        SetDefault => "SET DEFAULT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{Column, Constraint, ConstraintKind, ForeignKeyDef, Index, IndexColumn, IndexType, LogicalType, MatchMode, ReferentialAction};
    use crate::domain::sorter::DependencySorter;
    use crate::domain::value_objects::{ColumnName, ConstraintName, IndexName, TableName};
    use crate::infrastructure::db::dialect::{MysqlDialect, PostgresDialect, SqliteDialect};

    fn pk_index(col: &str) -> Index {
        Index {
            name: IndexName("PRIMARY".into()),
            index_type: IndexType::Primary,
            columns: vec![IndexColumn::new(col)],
            method: None,
            predicate: None,
        }
    }

    #[test]
    fn mysql_inlines_autoincrement_primary_key() {
        let mut table = Table::new("orders");
        let mut id = Column::new("id", LogicalType::Int);
        id.auto_increment = true;
        id.nullable = false;
        table.columns.push(id);
        table.indexes.push(pk_index("id"));

        let platform = MysqlDialect;
        let sort = DependencySorter::new().sort(&[table.clone()]);
        let rendered = Renderer::new(&platform).render(&table, &sort).unwrap();
        assert!(rendered.create_statement.contains("AUTO_INCREMENT"));
        assert!(rendered.create_statement.contains("PRIMARY KEY"));
    }

    #[test]
    fn sqlite_inlines_autoincrement_primary_key() {
        let mut table = Table::new("orders");
        let mut id = Column::new("id", LogicalType::Int);
        id.auto_increment = true;
        id.nullable = false;
        table.columns.push(id);
        table.indexes.push(pk_index("id"));

        let platform = SqliteDialect;
        let sort = DependencySorter::new().sort(&[table.clone()]);
        let rendered = Renderer::new(&platform).render(&table, &sort).unwrap();
        assert!(rendered.create_statement.contains("PRIMARY KEY AUTOINCREMENT"));
    }

    #[test]
    fn postgres_emits_table_level_pk_when_not_autoincrement() {
        let mut table = Table::new("lookups");
        table.columns.push(Column::new("code", LogicalType::Varchar(10)));
        table.indexes.push(pk_index("code"));

        let platform = PostgresDialect;
        let sort = DependencySorter::new().sort(&[table.clone()]);
        let rendered = Renderer::new(&platform).render(&table, &sort).unwrap();
        assert!(rendered.create_statement.contains("PRIMARY KEY (\"code\")"));
    }

    #[test]
    fn non_unique_index_is_always_deferred() {
        let mut table = Table::new("t");
        table.columns.push(Column::new("name", LogicalType::Text));
        table.indexes.push(Index {
            name: IndexName("t_name_idx".into()),
            index_type: IndexType::Plain,
            columns: vec![IndexColumn::new("name")],
            method: None,
            predicate: None,
        });

        let platform = PostgresDialect;
        let sort = DependencySorter::new().sort(&[table.clone()]);
        let rendered = Renderer::new(&platform).render(&table, &sort).unwrap();
        assert!(!rendered.create_statement.contains("INDEX"));
        assert_eq!(rendered.deferred_indexes.len(), 1);
    }

    /// §8 scenario 4: a cycle-participating FK is deferred to `ALTER TABLE`
    /// rather than inlined in the CREATE statement.
    #[test]
    fn cycle_participating_fk_is_deferred() {
        let mut a = Table::new("A");
        a.columns.push(Column::new("id", LogicalType::Int));
        a.columns.push(Column::new("b_id", LogicalType::Int));
        a.constraints.push(Constraint {
            name: ConstraintName("fk_a_b".into()),
            kind: ConstraintKind::ForeignKey(ForeignKeyDef {
                local_columns: vec![ColumnName("b_id".into())],
                referenced_table: TableName("B".into()),
                referenced_schema: None,
                referenced_columns: vec![ColumnName("id".into())],
                on_update: ReferentialAction::NoAction,
                on_delete: ReferentialAction::NoAction,
                match_mode: MatchMode::Simple,
                deferrable: false,
            }),
        });
        let mut b = Table::new("B");
        b.columns.push(Column::new("id", LogicalType::Int));
        b.columns.push(Column::new("a_id", LogicalType::Int));
        b.constraints.push(Constraint {
            name: ConstraintName("fk_b_a".into()),
            kind: ConstraintKind::ForeignKey(ForeignKeyDef {
                local_columns: vec![ColumnName("a_id".into())],
                referenced_table: TableName("A".into()),
                referenced_schema: None,
                referenced_columns: vec![ColumnName("id".into())],
                on_update: ReferentialAction::NoAction,
                on_delete: ReferentialAction::NoAction,
                match_mode: MatchMode::Simple,
                deferrable: false,
            }),
        });

        let sort = DependencySorter::new().sort(&[a.clone(), b.clone()]);
        let platform = PostgresDialect;
        let renderer = Renderer::new(&platform);

        // §8 scenario 4: exactly one FK inline, the other deferred. The
        // alphabetically-later table (B) is the one deferred; A's FK inlines.
        let rendered_a = renderer.render(&a, &sort).unwrap();
        assert!(rendered_a.create_statement.contains("FOREIGN KEY"));
        assert!(rendered_a.deferred_constraints.is_empty());

        let rendered_b = renderer.render(&b, &sort).unwrap();
        assert!(!rendered_b.create_statement.contains("FOREIGN KEY"));
        assert_eq!(rendered_b.deferred_constraints.len(), 1);
        assert!(rendered_b.deferred_constraints[0].starts_with("ALTER TABLE"));
    }

    #[test]
    fn postgres_table_comment_emits_comment_on_statement() {
        let mut table = Table::new("orders");
        table.columns.push(Column::new("id", LogicalType::Int));
        table.options.comment = Some("customer orders".to_string());

        let platform = PostgresDialect;
        let sort = DependencySorter::new().sort(&[table.clone()]);
        let rendered = Renderer::new(&platform).render(&table, &sort).unwrap();
        assert_eq!(rendered.comment_statements.len(), 1);
        assert!(rendered.comment_statements[0].contains("COMMENT ON TABLE"));
    }
}
