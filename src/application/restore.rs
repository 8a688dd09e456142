//! Restore Orchestrator (§4.7): consumes a backup script and a target
//! connection, applying dialect-specific session pragmas, then iterating
//! statements with the configured error policy.
//!
//! Grounded in the teacher's `ConflictService::check` loop shape (iterate,
//! classify, accumulate into a result record) and in the job status design
//! carried from `domain::error::JobStatus`.

use std::time::Instant;

use anyhow::Result;

use crate::domain::error::{truncate_statement, JobStatus, StatementError};
use crate::domain::ports::{CancellationToken, Connection, ProgressCallback, ProgressEvent};
use crate::domain::value_objects::EngineKind;
use crate::infrastructure::config::RestoreOptions;
use crate::parser::splitter::StatementSplitter;

pub struct RestoreOrchestrator<'a> {
    connection: &'a dyn Connection,
    options: &'a RestoreOptions,
    progress: ProgressCallback,
    cancel: &'a dyn CancellationToken,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        connection: &'a dyn Connection,
        options: &'a RestoreOptions,
        progress: ProgressCallback,
        cancel: &'a dyn CancellationToken,
    ) -> Self {
        Self {
            connection,
            options,
            progress,
            cancel,
        }
    }

    fn fire(&self, percent: u8, operation: impl Into<String>) {
        (self.progress)(&ProgressEvent {
            percent,
            operation: operation.into(),
            current_table: None,
            tables_done: None,
            total_tables: None,
        });
    }

    pub async fn run(&self, script: &str) -> Result<JobStatus> {
        let start = Instant::now();
        let engine = self.connection.engine_kind();

        self.apply_session_pragmas(engine).await?;

        let in_transaction = self.options.execute_in_transaction;
        if in_transaction {
            self.connection.begin().await?;
        }

        let statements = StatementSplitter::new(engine).split(script);
        let total = statements.len();
        let mut executed = 0usize;
        let mut errors = Vec::new();

        for (i, stmt) in statements.iter().enumerate() {
            if self.cancel.is_cancelled() {
                if in_transaction {
                    self.connection.rollback().await?;
                }
                return Ok(JobStatus::failure(start.elapsed().as_secs_f64(), "restore cancelled"));
            }

            match self.connection.exec(stmt).await {
                Ok(_) => {
                    executed += 1;
                }
                Err(err) => {
                    if self.options.continue_on_error {
                        errors.push(StatementError {
                            statement_index: i,
                            statement: truncate_statement(stmt, 200),
                            error: err.to_string(),
                        });
                    } else {
                        if in_transaction {
                            self.connection.rollback().await?;
                        }
                        let mut status = JobStatus::failure(
                            start.elapsed().as_secs_f64(),
                            format!("statement {i} failed: {err}"),
                        );
                        status.statements_executed = executed;
                        status.statements_failed = 1;
                        status.errors.push(StatementError {
                            statement_index: i,
                            statement: truncate_statement(stmt, 200),
                            error: err.to_string(),
                        });
                        return Ok(status);
                    }
                }
            }

            if total > 0 && i % 50 == 0 {
                self.fire((i * 100 / total.max(1)) as u8, "restore_statement");
            }
        }

        self.restore_session_defaults(engine).await?;

        if in_transaction {
            self.connection.commit().await?;
        }

        self.integrity_check(engine).await?;

        self.fire(100, "complete");

        let mut status = JobStatus::success(start.elapsed().as_secs_f64(), executed);
        status.statements_failed = errors.len();
        status.errors = errors;
        status.success = status.statements_failed == 0;
        Ok(status)
    }

    async fn apply_session_pragmas(&self, engine: EngineKind) -> Result<()> {
        match engine {
            EngineKind::Postgres => {
                self.connection.exec("SET client_encoding = 'UTF8'").await?;
            }
            EngineKind::Mysql => {
                self.connection.exec("SET FOREIGN_KEY_CHECKS = 0").await?;
                self.connection.exec("SET UNIQUE_CHECKS = 0").await?;
            }
            EngineKind::Sqlite => {
                self.connection.exec("PRAGMA foreign_keys = OFF").await?;
                self.connection.exec("PRAGMA synchronous = OFF").await?;
                self.connection.exec("PRAGMA journal_mode = MEMORY").await?;
            }
        }
        if self.options.disable_constraints && engine == EngineKind::Postgres {
            self.connection.exec("SET session_replication_role = 'replica'").await?;
        }
        Ok(())
    }

    async fn restore_session_defaults(&self, engine: EngineKind) -> Result<()> {
        match engine {
            EngineKind::Mysql => {
                self.connection.exec("SET FOREIGN_KEY_CHECKS = 1").await?;
                self.connection.exec("SET UNIQUE_CHECKS = 1").await?;
            }
            EngineKind::Sqlite => {
                self.connection.exec("PRAGMA foreign_keys = ON").await?;
            }
            EngineKind::Postgres => {
                if self.options.disable_constraints {
                    self.connection.exec("SET session_replication_role = 'origin'").await?;
                }
            }
        }
        Ok(())
    }

    /// §4.7: `PRAGMA integrity_check` for SQLite, a `SELECT 1` smoke test
    /// for the others — run after commit, failure surfaces as an error but
    /// does not roll back (the data is already committed).
    async fn integrity_check(&self, engine: EngineKind) -> Result<()> {
        let sql = match engine {
            EngineKind::Sqlite => "PRAGMA integrity_check",
            _ => "SELECT 1",
        };
        self.connection.query(sql).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{noop_progress, NeverCancelled, RowMap};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeConnection {
        engine: EngineKind,
        fail_on: Vec<String>,
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn query(&self, _sql: &str) -> anyhow::Result<Vec<RowMap>> {
            Ok(vec![std::collections::BTreeMap::new()])
        }
        async fn exec(&self, sql: &str) -> anyhow::Result<u64> {
            self.executed.lock().unwrap().push(sql.to_string());
            if self.fail_on.iter().any(|f| sql.contains(f.as_str())) {
                return Err(anyhow::anyhow!("simulated failure executing: {sql}"));
            }
            Ok(1)
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
            self.engine
        }
        fn server_version(&self) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn blank_and_comment_only_statements_are_skipped() {
        let conn = FakeConnection {
            engine: EngineKind::Postgres,
            fail_on: Vec::new(),
            executed: Mutex::new(Vec::new()),
        };
        let options = RestoreOptions::default();
        let orchestrator = RestoreOrchestrator::new(&conn, &options, noop_progress(), &NeverCancelled);
        let script = "-- just a comment\n\nINSERT INTO t VALUES (1);\n";
        let status = orchestrator.run(script).await.unwrap();
        assert!(status.success);
        assert_eq!(status.statements_executed, 1);
    }

    #[tokio::test]
    async fn stops_and_rolls_back_without_continue_on_error() {
        let conn = FakeConnection {
            engine: EngineKind::Postgres,
            fail_on: vec!["BROKEN".to_string()],
            executed: Mutex::new(Vec::new()),
        };
        let mut options = RestoreOptions::default();
        options.continue_on_error = false;
        let orchestrator = RestoreOrchestrator::new(&conn, &options, noop_progress(), &NeverCancelled);
        let script = "INSERT INTO t VALUES (1);\nBROKEN STATEMENT;\nINSERT INTO t VALUES (2);";
        let status = orchestrator.run(script).await.unwrap();
        assert!(!status.success);
        assert_eq!(status.statements_executed, 1);
        assert_eq!(status.errors.len(), 1);
    }

    #[tokio::test]
    async fn continue_on_error_records_and_proceeds() {
        let conn = FakeConnection {
            engine: EngineKind::Postgres,
            fail_on: vec!["BROKEN".to_string()],
            executed: Mutex::new(Vec::new()),
        };
        let mut options = RestoreOptions::default();
        options.continue_on_error = true;
        let orchestrator = RestoreOrchestrator::new(&conn, &options, noop_progress(), &NeverCancelled);
        let script = "INSERT INTO t VALUES (1);\nBROKEN STATEMENT;\nINSERT INTO t VALUES (2);";
        let status = orchestrator.run(script).await.unwrap();
        assert_eq!(status.statements_executed, 2);
        assert_eq!(status.statements_failed, 1);
        assert!(!status.success);
    }

    #[tokio::test]
    async fn sqlite_integrity_check_runs_after_commit() {
        let conn = FakeConnection {
            engine: EngineKind::Sqlite,
            fail_on: Vec::new(),
            executed: Mutex::new(Vec::new()),
        };
        let options = RestoreOptions::default();
        let orchestrator = RestoreOrchestrator::new(&conn, &options, noop_progress(), &NeverCancelled);
        let status = orchestrator.run("INSERT INTO t VALUES (1);").await.unwrap();
        assert!(status.success);
        let executed = conn.executed.lock().unwrap();
        assert!(executed.iter().any(|s| s.contains("journal_mode")));
    }
}
