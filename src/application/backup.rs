//! Backup Orchestrator (§4.6): sequences Header / DROP / CREATE TABLE / DATA
//! / DEFERRED INDEXES / DEFERRED CONSTRAINTS / TRIGGERS / SEQUENCE RESYNC /
//! Footer into one output script. Phase emission is strictly sequential
//! (§5's concurrency model); only the reflection fan-out upstream of this
//! orchestrator may use the teacher's per-table `tokio::spawn` pattern.
//!
//! Grounded in `application/diff.rs`'s phase-sequencing shape and in
//! `presentation/writers/sql.rs`'s `std::fmt::Write` script-assembly
//! convention — a `String` buffer built with `writeln!` rather than
//! `std::io::Write`.

use std::fmt::Write as FmtWrite;
use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::domain::error::JobStatus;
use crate::domain::ports::{CancellationToken, Connection, ProgressCallback, ProgressEvent};
use crate::domain::schema::Table;
use crate::domain::sorter::DependencySorter;
use crate::domain::value_objects::EngineKind;
use crate::infrastructure::config::BackupOptions;
use crate::infrastructure::db::dialect::Platform;
use crate::infrastructure::db::sql_utils::{build_count_query, build_paged_select};
use crate::presentation::renderer::Renderer;

pub struct BackupOutput {
    pub script: String,
    pub status: JobStatus,
}

pub struct BackupOrchestrator<'a> {
    connection: &'a dyn Connection,
    platform: &'a dyn Platform,
    options: &'a BackupOptions,
    progress: ProgressCallback,
    cancel: &'a dyn CancellationToken,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(
        connection: &'a dyn Connection,
        platform: &'a dyn Platform,
        options: &'a BackupOptions,
        progress: ProgressCallback,
        cancel: &'a dyn CancellationToken,
    ) -> Self {
        Self {
            connection,
            platform,
            options,
            progress,
            cancel,
        }
    }

    fn fire(&self, percent: u8, operation: impl Into<String>, current_table: Option<String>, tables_done: Option<usize>, total_tables: Option<usize>) {
        (self.progress)(&ProgressEvent {
            percent,
            operation: operation.into(),
            current_table,
            tables_done,
            total_tables,
        });
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(anyhow!("backup cancelled"));
        }
        Ok(())
    }

    /// Run the full backup against an already-reflected set of tables,
    /// producing the complete SQL script as a single string.
    pub async fn run(&self, db_name: &str, tables: &[Table]) -> Result<BackupOutput> {
        let start = Instant::now();
        let sort = DependencySorter::new().sort(tables);
        let renderer = Renderer::new(self.platform);
        let total_tables = tables.len();

        let mut script = String::new();
        let mut statements_executed = 0usize;

        self.write_header(&mut script, db_name)?;
        self.write_begin(&mut script)?;

        if self.options.include_drop_statements {
            self.write_phase_banner(&mut script, 1, "DROP")?;
            for name in sort.drop_order() {
                self.check_cancelled()?;
                let table = find_table(tables, &name)?;
                writeln!(script, "{}", self.render_drop(table))?;
                statements_executed += 1;
            }
            writeln!(script)?;
        }

        let mut rendered_by_table = std::collections::HashMap::new();
        if self.options.include_schema {
            self.write_phase_banner(&mut script, 2, "CREATE TABLE")?;
            for (i, name) in sort.order.iter().enumerate() {
                self.check_cancelled()?;
                let table = find_table(tables, name)?;
                let rendered = renderer.render(table, &sort)?;
                writeln!(script, "{}", rendered.create_statement)?;
                statements_executed += 1;
                self.fire(
                    10 + (i * 20 / total_tables.max(1)) as u8,
                    "create_table",
                    Some(name.0.clone()),
                    Some(i + 1),
                    Some(total_tables),
                );
                rendered_by_table.insert(name.clone(), rendered);
            }
            writeln!(script)?;
        }

        if self.options.include_data {
            self.write_phase_banner(&mut script, 3, "DATA")?;
            for (i, name) in sort.order.iter().enumerate() {
                self.check_cancelled()?;
                let table = find_table(tables, name)?;
                let inserts_emitted = self.write_table_data(&mut script, table).await?;
                statements_executed += inserts_emitted;
                self.fire(
                    30 + (i * 40 / total_tables.max(1)) as u8,
                    "copy_data",
                    Some(name.0.clone()),
                    Some(i + 1),
                    Some(total_tables),
                );
            }
            writeln!(script)?;
        }

        if self.options.include_indexes {
            self.write_phase_banner(&mut script, 4, "DEFERRED INDEXES")?;
            for name in &sort.order {
                self.check_cancelled()?;
                if let Some(rendered) = rendered_by_table.get(name) {
                    for stmt in &rendered.deferred_indexes {
                        writeln!(script, "{stmt}")?;
                        statements_executed += 1;
                    }
                }
            }
            writeln!(script)?;
        }

        if self.options.include_constraints {
            self.write_phase_banner(&mut script, 5, "DEFERRED CONSTRAINTS")?;
            for name in &sort.order {
                self.check_cancelled()?;
                if let Some(rendered) = rendered_by_table.get(name) {
                    for stmt in &rendered.deferred_constraints {
                        writeln!(script, "{stmt}")?;
                        statements_executed += 1;
                    }
                }
            }
            writeln!(script)?;
        }

        if self.options.include_triggers {
            self.write_phase_banner(&mut script, 6, "TRIGGERS")?;
            let mut emitted = std::collections::HashSet::new();
            for name in &sort.order {
                self.check_cancelled()?;
                let table = find_table(tables, name)?;
                for trigger in &table.triggers {
                    if !emitted.insert((trigger.table.0.clone(), trigger.name.clone())) {
                        continue; // duplicate-trigger suppression, keyed by (table, name)
                    }
                    self.write_trigger(&mut script, trigger)?;
                    statements_executed += 1;
                }
            }
            writeln!(script)?;
        }

        if self.options.include_sequences && self.platform.engine_kind() == EngineKind::Postgres {
            self.write_phase_banner(&mut script, 7, "SEQUENCE RESYNC")?;
            for name in &sort.order {
                self.check_cancelled()?;
                let table = find_table(tables, name)?;
                for column in &table.columns {
                    if !column.auto_increment {
                        continue;
                    }
                    let stmt = self.resync_sequence_statement(table, &column.name.0);
                    writeln!(script, "{stmt}")?;
                    statements_executed += 1;
                }
            }
            writeln!(script)?;
        }

        self.write_footer(&mut script)?;

        self.fire(100, "complete", None, Some(total_tables), Some(total_tables));

        Ok(BackupOutput {
            script,
            status: JobStatus::success(start.elapsed().as_secs_f64(), statements_executed),
        })
    }

    fn write_header(&self, script: &mut String, db_name: &str) -> Result<()> {
        let engine_label = match self.platform.engine_kind() {
            EngineKind::Postgres => "PostgreSQL",
            EngineKind::Mysql => "MySQL",
            EngineKind::Sqlite => "SQLite",
        };
        writeln!(script, "-- {engine_label} Database Backup")?;
        writeln!(script, "-- Database: {db_name}")?;
        writeln!(script, "-- Generated: {}", chrono::Utc::now().to_rfc3339())?;
        if let Some(version) = self.connection.server_version() {
            writeln!(script, "-- Server version: {version}")?;
        }
        writeln!(script)?;

        match self.platform.engine_kind() {
            EngineKind::Postgres => {
                writeln!(script, "SET client_encoding = 'UTF8';")?;
                if self.options.set_timezone_utc {
                    writeln!(script, "SET TIME ZONE 'UTC';")?;
                }
            }
            EngineKind::Mysql => {
                writeln!(script, "SET NAMES utf8mb4;")?;
                if self.options.disable_foreign_keys {
                    writeln!(script, "SET FOREIGN_KEY_CHECKS = 0;")?;
                }
                writeln!(script, "SET UNIQUE_CHECKS = 0;")?;
                if self.options.set_timezone_utc {
                    writeln!(script, "SET TIME_ZONE = '+00:00';")?;
                }
            }
            EngineKind::Sqlite => {
                writeln!(script, "PRAGMA synchronous = OFF;")?;
                writeln!(script, "PRAGMA foreign_keys = OFF;")?;
            }
        }
        writeln!(script)?;
        Ok(())
    }

    fn write_begin(&self, script: &mut String) -> Result<()> {
        if self.platform.engine_kind() == EngineKind::Mysql {
            writeln!(script, "SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ;")?;
            writeln!(script, "START TRANSACTION;")?;
        } else {
            writeln!(script, "BEGIN;")?;
        }
        writeln!(script)?;
        Ok(())
    }

    fn write_footer(&self, script: &mut String) -> Result<()> {
        writeln!(script, "-- === Footer: restore session defaults ===")?;
        match self.platform.engine_kind() {
            EngineKind::Mysql => {
                writeln!(script, "SET UNIQUE_CHECKS = 1;")?;
                if self.options.disable_foreign_keys {
                    writeln!(script, "SET FOREIGN_KEY_CHECKS = 1;")?;
                }
            }
            EngineKind::Sqlite => {
                writeln!(script, "PRAGMA foreign_keys = ON;")?;
            }
            EngineKind::Postgres => {}
        }
        writeln!(script, "COMMIT;")?;
        Ok(())
    }

    fn write_phase_banner(&self, script: &mut String, n: u8, title: &str) -> Result<()> {
        writeln!(script, "-- === Phase {n}: {title} ===")?;
        Ok(())
    }

    fn render_drop(&self, table: &Table) -> String {
        let q = |s: &str| self.platform.quote_identifier(s);
        let qualified = match &table.schema {
            Some(schema) if !self.platform.schema_prefix(schema).is_empty() => {
                format!("{}{}", self.platform.schema_prefix(schema), q(&table.name.0))
            }
            _ => q(&table.name.0),
        };
        match self.platform.engine_kind() {
            EngineKind::Postgres => format!("DROP TABLE IF EXISTS {qualified} CASCADE;"),
            _ => format!("DROP TABLE IF EXISTS {qualified};"),
        }
    }

    /// Paged `SELECT` loop over `table`, one multi-row `INSERT` per chunk;
    /// writes directly into `script` so no chunk's rows are held beyond the
    /// one currently being formatted (§4.6 phase 3: "without buffering the
    /// full chunk set in memory").
    async fn write_table_data(&self, script: &mut String, table: &Table) -> Result<usize> {
        if table.columns.is_empty() {
            return Ok(0);
        }
        let count_sql = build_count_query(table, self.platform);
        let count_rows = self.connection.query(&count_sql).await?;
        let total: i64 = count_rows
            .first()
            .and_then(|r| r.values().next())
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if total == 0 {
            return Ok(0);
        }

        let chunk_size = self.options.chunk_size.max(1);
        let q = |s: &str| self.platform.quote_identifier(s);
        let qualified = match &table.schema {
            Some(schema) if !self.platform.schema_prefix(schema).is_empty() => {
                format!("{}{}", self.platform.schema_prefix(schema), q(&table.name.0))
            }
            _ => q(&table.name.0),
        };
        let column_list = table
            .columns
            .iter()
            .map(|c| q(&c.name.0))
            .collect::<Vec<_>>()
            .join(", ");

        let mut offset = 0usize;
        let mut inserts_emitted = 0usize;
        loop {
            self.check_cancelled()?;
            let sql = build_paged_select(table, self.platform, chunk_size, offset);
            let rows = self.connection.query(&sql).await?;
            if rows.is_empty() {
                break;
            }
            let value_tuples = rows
                .iter()
                .map(|row| {
                    let items = table
                        .columns
                        .iter()
                        .map(|col| {
                            let value = row.get(col.name.0.as_str()).cloned().unwrap_or(serde_json::Value::Null);
                            self.platform.quote_literal(&value, &col.logical_type)
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({items})")
                })
                .collect::<Vec<_>>()
                .join(",\n  ");
            writeln!(
                script,
                "INSERT INTO {qualified} ({column_list}) VALUES\n  {value_tuples};"
            )?;
            inserts_emitted += 1;
            let rows_in_chunk = rows.len();
            offset += chunk_size;
            if rows_in_chunk < chunk_size {
                break;
            }
        }
        Ok(inserts_emitted)
    }

    fn write_trigger(&self, script: &mut String, trigger: &crate::domain::schema::Trigger) -> Result<()> {
        if self.platform.engine_kind() == EngineKind::Mysql {
            writeln!(script, "DELIMITER $$")?;
            writeln!(script, "{}$$", trigger.definition.trim_end_matches(';'))?;
            writeln!(script, "DELIMITER ;")?;
        } else {
            writeln!(script, "{};", trigger.definition.trim_end_matches(';'))?;
        }
        Ok(())
    }

    /// §4.8: Postgres sequences are independent objects — resolve the one
    /// backing `column` and resync it to the table's current max, or reset
    /// to 1 for an empty table.
    fn resync_sequence_statement(&self, table: &Table, column: &str) -> String {
        let q = |s: &str| self.platform.quote_identifier(s);
        let seq_expr = format!(
            "pg_get_serial_sequence('{}', '{}')",
            table.name.0, column
        );
        format!(
            "SELECT setval({seq_expr}, COALESCE((SELECT MAX({col}) FROM {tbl}), 0) + 1, false);",
            seq_expr = seq_expr,
            col = q(column),
            tbl = q(&table.name.0),
        )
    }
}

fn find_table<'a>(tables: &'a [Table], name: &crate::domain::value_objects::TableName) -> Result<&'a Table> {
    tables
        .iter()
        .find(|t| &t.name == name)
        .ok_or_else(|| anyhow!("table {} missing from reflected set", name.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{noop_progress, NeverCancelled};
    use crate::domain::schema::{Column, LogicalType};
    use crate::infrastructure::config::BackupOptions;
    use crate::infrastructure::db::dialect::PostgresDialect;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeConnection {
        rows_by_query: Mutex<Vec<(String, Vec<crate::domain::ports::RowMap>)>>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn query(&self, sql: &str) -> anyhow::Result<Vec<crate::domain::ports::RowMap>> {
            let guard = self.rows_by_query.lock().unwrap();
            for (pattern, rows) in guard.iter() {
                if sql.contains(pattern.as_str()) {
                    return Ok(rows.clone());
                }
            }
            Ok(Vec::new())
        }
        async fn exec(&self, _sql: &str) -> anyhow::Result<u64> {
            Ok(0)
        }
        async fn begin(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn commit(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn rollback(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn engine_kind(&self) -> EngineKind {
            EngineKind::Postgres
        }
        fn server_version(&self) -> Option<String> {
            Some("16.0".to_string())
        }
    }

    fn simple_table() -> Table {
        let mut t = Table::new("widgets");
        t.columns.push(Column::new("id", LogicalType::Int));
        t.columns.push(Column::new("name", LogicalType::Text));
        t
    }

    #[tokio::test]
    async fn empty_table_emits_no_insert_statements() {
        let conn = FakeConnection {
            rows_by_query: Mutex::new(vec![(
                "COUNT(*)".to_string(),
                vec![std::collections::BTreeMap::from([(
                    "count".to_string(),
                    serde_json::json!(0),
                )])],
            )]),
        };
        let platform = PostgresDialect;
        let options = BackupOptions::default();
        let orchestrator = BackupOrchestrator::new(&conn, &platform, &options, noop_progress(), &NeverCancelled);
        let tables = vec![simple_table()];
        let output = orchestrator.run("testdb", &tables).await.unwrap();
        assert!(!output.script.contains("INSERT INTO"));
        assert!(output.script.contains("CREATE TABLE"));
        assert!(output.status.success);
    }

    #[tokio::test]
    async fn script_begins_with_begin_and_ends_with_commit() {
        let conn = FakeConnection {
            rows_by_query: Mutex::new(Vec::new()),
        };
        let platform = PostgresDialect;
        let options = BackupOptions::default();
        let orchestrator = BackupOrchestrator::new(&conn, &platform, &options, noop_progress(), &NeverCancelled);
        let tables = vec![simple_table()];
        let output = orchestrator.run("testdb", &tables).await.unwrap();
        assert!(output.script.contains("BEGIN;"));
        assert!(output.script.trim_end().ends_with("COMMIT;"));
    }

    /// §8 scenario 5: 2,500 rows with chunk_size=1000 yields three INSERTs
    /// of 1000/1000/500 rows.
    #[tokio::test]
    async fn chunked_data_fidelity_produces_three_inserts() {
        fn page(offset: i64, n: usize) -> Vec<crate::domain::ports::RowMap> {
            (0..n)
                .map(|i| {
                    std::collections::BTreeMap::from([
                        ("id".to_string(), serde_json::json!(offset + i as i64)),
                        ("name".to_string(), serde_json::json!(format!("row{}", offset + i as i64))),
                    ])
                })
                .collect()
        }
        let conn = FakeConnection {
            rows_by_query: Mutex::new(vec![
                ("COUNT(*)".to_string(), vec![std::collections::BTreeMap::from([("count".to_string(), serde_json::json!(2500))])]),
                ("OFFSET 0".to_string(), page(0, 1000)),
                ("OFFSET 1000".to_string(), page(1000, 1000)),
                ("OFFSET 2000".to_string(), page(2000, 500)),
            ]),
        };
        let platform = PostgresDialect;
        let mut options = BackupOptions::default();
        options.chunk_size = 1000;
        options.include_drop_statements = false;
        options.include_schema = false;
        options.include_indexes = false;
        options.include_constraints = false;
        options.include_triggers = false;
        options.include_sequences = false;
        let orchestrator = BackupOrchestrator::new(&conn, &platform, &options, noop_progress(), &NeverCancelled);
        let tables = vec![simple_table()];
        let output = orchestrator.run("testdb", &tables).await.unwrap();
        let insert_count = output.script.matches("INSERT INTO").count();
        assert_eq!(insert_count, 3);
    }

    #[tokio::test]
    async fn mysql_triggers_use_delimiter_framing() {
        use crate::domain::schema::Trigger;
        use crate::infrastructure::db::dialect::MysqlDialect;

        struct MysqlFake;
        #[async_trait]
        impl Connection for MysqlFake {
            async fn query(&self, _sql: &str) -> anyhow::Result<Vec<crate::domain::ports::RowMap>> {
                Ok(Vec::new())
            }
            async fn exec(&self, _sql: &str) -> anyhow::Result<u64> {
                Ok(0)
            }
            async fn begin(&self) -> anyhow::Result<()> {
                Ok(())
            }
            async fn commit(&self) -> anyhow::Result<()> {
                Ok(())
            }
            async fn rollback(&self) -> anyhow::Result<()> {
                Ok(())
            }
            fn engine_kind(&self) -> EngineKind {
                EngineKind::Mysql
            }
            fn server_version(&self) -> Option<String> {
                Some("8.0".to_string())
            }
        }

        let conn = MysqlFake;
        let platform = MysqlDialect;
        let options = BackupOptions::default();
        let orchestrator = BackupOrchestrator::new(&conn, &platform, &options, noop_progress(), &NeverCancelled);
        let mut table = simple_table();
        table.triggers.push(Trigger {
            name: "widgets_bi".to_string(),
            table: table.name.clone(),
            definition: "CREATE TRIGGER `widgets_bi` BEFORE INSERT ON `widgets` FOR EACH ROW SET NEW.id = NEW.id".to_string(),
        });
        let tables = vec![table];
        let output = orchestrator.run("testdb", &tables).await.unwrap();
        assert!(output.script.contains("DELIMITER $$"));
        assert!(output.script.contains("DELIMITER ;"));
    }

    #[tokio::test]
    async fn same_trigger_name_on_different_tables_is_not_suppressed() {
        use crate::domain::schema::Trigger;
        let conn = FakeConnection {
            rows_by_query: Mutex::new(Vec::new()),
        };
        let platform = PostgresDialect;
        let options = BackupOptions::default();
        let orchestrator = BackupOrchestrator::new(&conn, &platform, &options, noop_progress(), &NeverCancelled);
        let mut a = simple_table();
        a.triggers.push(Trigger {
            name: "shared_trg".to_string(),
            table: a.name.clone(),
            definition: "CREATE TRIGGER shared_trg BEFORE INSERT ON widgets FOR EACH ROW EXECUTE FUNCTION f()".to_string(),
        });
        let mut b = Table::new("gadgets");
        b.columns.push(Column::new("id", LogicalType::Int));
        b.triggers.push(Trigger {
            name: "shared_trg".to_string(),
            table: b.name.clone(),
            definition: "CREATE TRIGGER shared_trg BEFORE INSERT ON gadgets FOR EACH ROW EXECUTE FUNCTION f()".to_string(),
        });
        let tables = vec![a, b];
        let output = orchestrator.run("testdb", &tables).await.unwrap();
        // Same trigger name on two distinct tables — both must survive (§4.6 phase 6 keys
        // suppression by (table, name), not by name alone).
        assert_eq!(output.script.matches("CREATE TRIGGER shared_trg").count(), 2);
        assert!(output.script.contains("ON widgets"));
        assert!(output.script.contains("ON gadgets"));
    }

    #[tokio::test]
    async fn duplicate_trigger_on_same_table_is_suppressed() {
        use crate::domain::schema::Trigger;
        let conn = FakeConnection {
            rows_by_query: Mutex::new(Vec::new()),
        };
        let platform = PostgresDialect;
        let options = BackupOptions::default();
        let orchestrator = BackupOrchestrator::new(&conn, &platform, &options, noop_progress(), &NeverCancelled);
        let mut a = simple_table();
        a.triggers.push(Trigger {
            name: "shared_trg".to_string(),
            table: a.name.clone(),
            definition: "CREATE TRIGGER shared_trg BEFORE INSERT ON widgets FOR EACH ROW EXECUTE FUNCTION f()".to_string(),
        });
        a.triggers.push(Trigger {
            name: "shared_trg".to_string(),
            table: a.name.clone(),
            definition: "CREATE TRIGGER shared_trg BEFORE INSERT ON widgets FOR EACH ROW EXECUTE FUNCTION f()".to_string(),
        });
        let tables = vec![a];
        let output = orchestrator.run("testdb", &tables).await.unwrap();
        assert_eq!(output.script.matches("CREATE TRIGGER shared_trg").count(), 1);
    }

    #[tokio::test]
    async fn postgres_sequence_resync_emitted_for_autoincrement_column() {
        let conn = FakeConnection {
            rows_by_query: Mutex::new(vec![(
                "COUNT(*)".to_string(),
                vec![std::collections::BTreeMap::from([("count".to_string(), serde_json::json!(0))])],
            )]),
        };
        let platform = PostgresDialect;
        let options = BackupOptions::default();
        let orchestrator = BackupOrchestrator::new(&conn, &platform, &options, noop_progress(), &NeverCancelled);
        let mut table = simple_table();
        table.columns[0].auto_increment = true;
        let tables = vec![table];
        let output = orchestrator.run("testdb", &tables).await.unwrap();
        assert!(output.script.contains("setval("));
    }
}
