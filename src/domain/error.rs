//! Typed error kinds for the core (§7). Internal code matches on these;
//! top-level entry points convert to `anyhow::Error` with `.context(...)`,
//! the way every teacher entry point does.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("parse failed at statement {statement_index}: {text}")]
    ParseFailed {
        statement_index: usize,
        text: String,
    },

    #[error("dependency cycle could not be resolved: {tables:?}")]
    DependencyCycleUnresolvable { tables: Vec<String> },

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("cancellation requested")]
    CancellationRequested,

    #[error("statement {statement_index} failed: {source}")]
    StatementExecutionFailed {
        statement_index: usize,
        sql: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Truncate a statement to at most `n` chars for error reporting (§4.7: "≤200 chars").
pub fn truncate_statement(sql: &str, n: usize) -> String {
    if sql.chars().count() <= n {
        sql.to_string()
    } else {
        let truncated: String = sql.chars().take(n).collect();
        format!("{truncated}…")
    }
}

/// One failed-statement record kept in a [`JobStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct StatementError {
    pub statement_index: usize,
    /// Truncated to <=200 chars per §4.7.
    pub statement: String,
    pub error: String,
}

/// Every job (backup or restore) returns this status record (§7).
#[derive(Debug, Clone, Serialize, Default)]
pub struct JobStatus {
    pub success: bool,
    pub error: Option<String>,
    pub duration_seconds: f64,
    pub statements_executed: usize,
    pub statements_failed: usize,
    pub errors: Vec<StatementError>,
}

impl JobStatus {
    pub fn success(duration_seconds: f64, statements_executed: usize) -> Self {
        Self {
            success: true,
            error: None,
            duration_seconds,
            statements_executed,
            statements_failed: 0,
            errors: Vec::new(),
        }
    }

    pub fn failure(duration_seconds: f64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            duration_seconds,
            statements_executed: 0,
            statements_failed: 0,
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_statement_unchanged() {
        assert_eq!(truncate_statement("SELECT 1", 200), "SELECT 1");
    }

    #[test]
    fn truncate_long_statement_capped() {
        let sql = "x".repeat(500);
        let truncated = truncate_statement(&sql, 200);
        assert_eq!(truncated.chars().count(), 201); // 200 chars + ellipsis
    }
}
