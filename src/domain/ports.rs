//! Collaborator interfaces (ports) the core depends on but does not own the
//! implementation of — connections, progress reporting, cancellation. Mirrors
//! the teacher's `domain::ports` (`RowRepository`, `Differ`, `OutputWriter`):
//! small traits passed in at construction rather than deep mixin hierarchies.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::value_objects::EngineKind;

/// A single row as a sorted map of column name -> JSON value. Schema is
/// described, not content — this type only appears transiently while
/// streaming data through a chunked SELECT; it is never stored on [`crate::domain::schema::Table`].
pub type RowMap = std::collections::BTreeMap<String, serde_json::Value>;

/// Port: the connection handle abstraction of §6. The concrete driver
/// (`sqlx::AnyPool`) is not the core's concern; orchestrators only see this.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn query(&self, sql: &str) -> Result<Vec<RowMap>>;
    async fn exec(&self, sql: &str) -> Result<u64>;
    async fn begin(&self) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
    fn engine_kind(&self) -> EngineKind;
    fn server_version(&self) -> Option<String>;
}

/// `OnProgress({percent, operation, currentTable?, tablesDone?, totalTables?})` (§6).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub operation: String,
    pub current_table: Option<String>,
    pub tables_done: Option<usize>,
    pub total_tables: Option<usize>,
}

/// Invoked from the orchestrator thread; must not call back into the
/// orchestrator. Fired synchronously; the return value is ignored.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// A no-op progress callback for callers that don't care.
pub fn noop_progress() -> ProgressCallback {
    Arc::new(|_event| {})
}

/// Port: cooperative cancellation, consulted between statements/chunks (§5).
pub trait CancellationToken: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// Simple `AtomicBool`-backed cancellation flag — the default implementation
/// used outside of tests that need a custom token.
#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl CancellationToken for CancellationFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A token that never cancels, for callers that don't need cooperative cancellation.
pub struct NeverCancelled;

impl CancellationToken for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_flag_starts_uncancelled() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn never_cancelled_is_always_false() {
        assert!(!NeverCancelled.is_cancelled());
    }
}
