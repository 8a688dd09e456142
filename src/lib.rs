use anyhow::{Context, Result};

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod parser;
pub mod presentation;

// ─── Log level ──────────────────────────────────────────────────────────────

/// Controls the verbosity of crosstab's internal tracing output.
///
/// Pass to [`init_tracing`] before calling any async entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

/// Initialise the global `tracing` subscriber for crosstab.
///
/// Respects `RUST_LOG` when set, falling back to `level` otherwise. Call
/// once at application startup, before any crosstab async function.
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let default_filter = match level {
        LogLevel::Error => "crosstab=error",
        LogLevel::Info => "crosstab=info",
        LogLevel::Debug => "crosstab=debug",
    };

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

// ─── Public API facade ──────────────────────────────────────────────────────

pub use application::backup::BackupOutput;
pub use application::monitoring::PerfReport;
pub use domain::error::{EngineError, JobStatus, StatementError};
pub use domain::ports::{CancellationFlag, CancellationToken, NeverCancelled, ProgressCallback, ProgressEvent};
pub use domain::schema::Table;
pub use domain::value_objects::EngineKind;
pub use infrastructure::config::{AppConfig, BackupOptions, DbConfig, OutputConfig, RestoreOptions};

use crate::application::backup::BackupOrchestrator;
use crate::application::monitoring::MonitoringConnection;
use crate::application::restore::RestoreOrchestrator;
use crate::domain::ports::noop_progress;
use crate::infrastructure::db::client::connect;
use crate::infrastructure::db::dialect;
use crate::infrastructure::db::reflector;

// ─── Public entry points ────────────────────────────────────────────────────

/// Reflect `cfg.source` and run the full backup pipeline, returning the
/// generated script and a job status. Uses a no-op progress callback and a
/// cancellation token that never cancels.
pub async fn backup(cfg: &AppConfig) -> Result<BackupOutput> {
    backup_with_progress(cfg, noop_progress(), &domain::ports::NeverCancelled).await
}

/// Like [`backup`], with an explicit progress callback and cancellation token.
pub async fn backup_with_progress(
    cfg: &AppConfig,
    progress: ProgressCallback,
    cancel: &dyn CancellationToken,
) -> Result<BackupOutput> {
    let engine = EngineKind::from_driver(&cfg.source.driver);
    let platform = dialect::from_engine_kind(engine);

    let sqlx_conn = connect(&cfg.source).await?;
    let tables = reflector::for_engine(engine)
        .reflect(sqlx_conn.pool())
        .await
        .context("schema reflection failed")?;

    let monitored = MonitoringConnection::new(sqlx_conn);
    let orchestrator = BackupOrchestrator::new(&monitored, platform.as_ref(), &cfg.backup, progress, cancel);
    orchestrator.run(&cfg.source.dbname, &tables).await
}

/// Restore `script` against `cfg.source` (the restore target), returning an
/// execution summary. Uses a no-op progress callback and a cancellation
/// token that never cancels.
pub async fn restore(cfg: &AppConfig, script: &str) -> Result<JobStatus> {
    restore_with_progress(cfg, script, noop_progress(), &domain::ports::NeverCancelled).await
}

/// Like [`restore`], with an explicit progress callback and cancellation token.
pub async fn restore_with_progress(
    cfg: &AppConfig,
    script: &str,
    progress: ProgressCallback,
    cancel: &dyn CancellationToken,
) -> Result<JobStatus> {
    let sqlx_conn = connect(&cfg.source).await?;
    let monitored = MonitoringConnection::new(sqlx_conn);
    let orchestrator = RestoreOrchestrator::new(&monitored, &cfg.restore, progress, cancel);
    orchestrator.run(script).await
}

/// Reflect `cfg.source`'s schema without running a full backup — used by
/// `--dry-run` to print a backup plan.
pub async fn reflect_schema(cfg: &AppConfig) -> Result<Vec<Table>> {
    let engine = EngineKind::from_driver(&cfg.source.driver);
    let sqlx_conn = connect(&cfg.source).await?;
    reflector::for_engine(engine)
        .reflect(sqlx_conn.pool())
        .await
        .context("schema reflection failed")
}

/// Validate a restore script against §6's file-format contract without
/// executing it: non-empty, recognisable header comment, at least one
/// `CREATE TABLE` (when the schema phase was included), begins with a
/// transaction-open statement and ends with `COMMIT`.
pub fn validate_backup_script(script: &str) -> Result<()> {
    if script.trim().is_empty() {
        anyhow::bail!("backup script is empty");
    }
    let trimmed = script.trim_start();
    if !trimmed.starts_with("--") {
        anyhow::bail!("backup script is missing its header comment");
    }
    let body = script.trim_end();
    if !body.ends_with("COMMIT;") {
        anyhow::bail!("backup script does not end with COMMIT;");
    }
    if !script.contains("BEGIN;") && !script.contains("START TRANSACTION;") {
        anyhow::bail!("backup script does not open a transaction");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_script() {
        assert!(validate_backup_script("").is_err());
    }

    #[test]
    fn validate_accepts_well_formed_script() {
        let script = "-- PostgreSQL Database Backup\nBEGIN;\nCOMMIT;\n";
        assert!(validate_backup_script(script).is_ok());
    }

    #[test]
    fn validate_rejects_missing_commit() {
        let script = "-- PostgreSQL Database Backup\nBEGIN;\nSELECT 1;\n";
        assert!(validate_backup_script(script).is_err());
    }
}
