//! Timing decorator around a [`Connection`], generalized from the teacher's
//! `MonitoringRowRepository`/`MonitoringDiffer` `#[instrument]` wrappers.
//! Wraps every query/exec call with a `tracing` span and accumulates a
//! [`PerfReport`] the CLI can print alongside the job summary.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

use crate::domain::ports::{Connection, RowMap};
use crate::domain::value_objects::EngineKind;

#[derive(Debug, Clone)]
pub struct Timing {
    pub operation: String,
    pub table: String,
    pub rows: usize,
    pub duration_ms: u128,
}

#[derive(Debug, Default)]
pub struct PerfReport {
    pub timings: Vec<Timing>,
}

impl PerfReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, operation: impl Into<String>, table: impl Into<String>, rows: usize, duration_ms: u128) {
        self.timings.push(Timing {
            operation: operation.into(),
            table: table.into(),
            rows,
            duration_ms,
        });
    }

    pub fn total_rows_fetched(&self) -> usize {
        self.timings.iter().map(|t| t.rows).sum()
    }

    pub fn total_ms(&self) -> u128 {
        self.timings.iter().map(|t| t.duration_ms).sum()
    }
}

/// Wraps a [`Connection`] so every `query`/`exec` call is timed and recorded
/// into a shared [`PerfReport`], without the orchestrator needing to thread
/// timing calls through its own logic.
pub struct MonitoringConnection<C: Connection> {
    inner: C,
    report: Mutex<PerfReport>,
}

impl<C: Connection> MonitoringConnection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            report: Mutex::new(PerfReport::new()),
        }
    }

    pub fn take_report(&self) -> PerfReport {
        let mut guard = self.report.lock().expect("perf report mutex poisoned");
        std::mem::take(&mut *guard)
    }
}

#[async_trait]
impl<C: Connection> Connection for MonitoringConnection<C> {
    #[instrument(name = "query", skip(self, sql), fields(db.rows), level = "debug")]
    async fn query(&self, sql: &str) -> Result<Vec<RowMap>> {
        let start = Instant::now();
        let rows = self.inner.query(sql).await?;
        self.record("query", rows.len(), start.elapsed().as_millis());
        Ok(rows)
    }

    #[instrument(name = "exec", skip(self, sql), level = "debug")]
    async fn exec(&self, sql: &str) -> Result<u64> {
        let start = Instant::now();
        let affected = self.inner.exec(sql).await?;
        self.record("exec", affected as usize, start.elapsed().as_millis());
        Ok(affected)
    }

    async fn begin(&self) -> Result<()> {
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        self.inner.rollback().await
    }

    fn engine_kind(&self) -> EngineKind {
        self.inner.engine_kind()
    }

    fn server_version(&self) -> Option<String> {
        self.inner.server_version()
    }
}

impl<C: Connection> MonitoringConnection<C> {
    fn record(&self, operation: &str, rows: usize, duration_ms: u128) {
        self.report
            .lock()
            .expect("perf report mutex poisoned")
            .record(operation, "", rows, duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perf_report_sums_rows_and_duration() {
        let mut report = PerfReport::new();
        report.record("query", "orders", 100, 12);
        report.record("query", "customers", 50, 8);
        assert_eq!(report.total_rows_fetched(), 150);
        assert_eq!(report.total_ms(), 20);
    }
}
