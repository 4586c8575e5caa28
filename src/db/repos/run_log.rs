use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{LogEntry, NewLogEntry, RunRecord, RunStatus},
};

/// Persistence for the audit log and the run history.
///
/// Both tables are append-only from the engine's point of view: run rows are
/// updated exactly once when they finish and both are pruned in bulk.
#[async_trait]
pub trait RunLogRepo: Send + Sync {
    // ==================== Runs ====================

    /// Insert a new run in the `running` state.
    async fn create_run(&self, started_at: DateTime<Utc>, message: &str) -> DbResult<RunRecord>;

    /// Move a `running` run to a terminal status.
    ///
    /// Returns `DbError::NotFound` if the run does not exist and
    /// `DbError::Conflict` if it already finished.
    async fn finish_run(&self, id: i64, status: RunStatus, message: &str) -> DbResult<()>;

    /// Force every run still `running` that started before `started_before`
    /// to `error`, appending `marker` to its message.
    ///
    /// Returns the number of runs reclaimed.
    async fn expire_stale_runs(
        &self,
        started_before: DateTime<Utc>,
        marker: &str,
    ) -> DbResult<u64>;

    /// Most recent run that is still `running`, if any.
    async fn find_active_run(&self) -> DbResult<Option<RunRecord>>;

    /// Most recent runs, newest first.
    async fn list_runs(&self, limit: u32) -> DbResult<Vec<RunRecord>>;

    /// Delete the oldest runs beyond `keep`, never touching `running` rows.
    async fn prune_runs(&self, keep: u32) -> DbResult<u64>;

    // ==================== Log entries ====================

    /// Append one audit log entry.
    async fn create_log(&self, input: NewLogEntry) -> DbResult<LogEntry>;

    /// Most recent log entries, newest first.
    async fn list_logs(&self, limit: u32) -> DbResult<Vec<LogEntry>>;

    async fn count_logs(&self) -> DbResult<i64>;

    /// Delete the oldest log entries beyond `keep`.
    async fn prune_logs(&self, keep: u32) -> DbResult<u64>;
}
