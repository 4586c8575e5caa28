use std::{collections::HashMap, sync::Arc};

use chrono::Duration;
use tracing::{debug, info, warn};

use super::{
    clock::Clock,
    error::{RetentionError, RetentionResult},
};
use crate::{
    db::{DbResult, RunLogRepo},
    models::{AppliedAction, Category, LogStatus, NewLogEntry, Record, RunRecord, RunStatus},
};

/// Runs left `running` for longer than this are treated as crashed.
pub const STALE_RUN_HOURS: i64 = 1;

/// Appended to the message of a run reclaimed as crashed.
pub const TIMEOUT_MARKER: &str = " [Timeout]";

/// Number of runs kept in the run history.
pub const RUN_HISTORY_LIMIT: u32 = 50;

/// Label written for categories the host no longer lists.
pub const UNKNOWN_CATEGORY_LABEL: &str = "unknown";

/// Run and audit log bookkeeping for one engine invocation.
pub struct RunLogger {
    repo: Arc<dyn RunLogRepo>,
    clock: Arc<dyn Clock>,
    labels: HashMap<String, String>,
}

impl RunLogger {
    pub fn new(repo: Arc<dyn RunLogRepo>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            labels: HashMap::new(),
        }
    }

    /// Remember display labels for the categories of this invocation.
    pub fn with_labels<'a>(mut self, categories: impl IntoIterator<Item = &'a Category>) -> Self {
        self.labels = categories
            .into_iter()
            .map(|c| (c.id.clone(), c.label.clone()))
            .collect();
        self
    }

    fn label_for(&self, category_id: &str) -> String {
        self.labels
            .get(category_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_CATEGORY_LABEL.to_string())
    }

    /// Open a run.
    ///
    /// Runs stuck in `running` for over an hour are first closed as `error`.
    /// A younger `running` row means another invocation is active.
    pub async fn start_run(&self, message: &str) -> RetentionResult<RunRecord> {
        let now = self.clock.now();

        let reclaimed = self
            .repo
            .expire_stale_runs(now - Duration::hours(STALE_RUN_HOURS), TIMEOUT_MARKER)
            .await?;
        if reclaimed > 0 {
            warn!(count = reclaimed, "Reclaimed stale retention runs");
        }

        if let Some(active) = self.repo.find_active_run().await? {
            return Err(RetentionError::RunInProgress { run_id: active.id });
        }

        let run = self.repo.create_run(now, message).await?;
        debug!(run_id = run.id, "Retention run started");
        Ok(run)
    }

    /// Close a run, then trim the run history.
    ///
    /// Failing to trim the history is logged, not returned.
    pub async fn finish_run(&self, run_id: i64, status: RunStatus, message: &str) -> DbResult<()> {
        self.repo.finish_run(run_id, status, message).await?;
        info!(run_id, status = %status, summary = message, "Retention run finished");

        if let Err(e) = self.prune_runs(RUN_HISTORY_LIMIT).await {
            warn!(error = %e, "Failed to prune retention run history");
        }
        Ok(())
    }

    /// Append one audit log entry for a processed record.
    pub async fn log(
        &self,
        record: &Record,
        status: LogStatus,
        actions: Vec<AppliedAction>,
        message: impl Into<String>,
    ) -> DbResult<()> {
        let entry = NewLogEntry {
            time: self.clock.now(),
            category_id: record.category_id.clone(),
            category_label: self.label_for(&record.category_id),
            record_id: record.id,
            record_created_at: record.created_at,
            status,
            actions,
            message: message.into(),
        };
        self.repo.create_log(entry).await?;
        Ok(())
    }

    pub async fn prune_logs(&self, keep: u32) -> DbResult<u64> {
        let pruned = self.repo.prune_logs(keep).await?;
        if pruned > 0 {
            debug!(pruned, keep, "Pruned retention log");
        }
        Ok(pruned)
    }

    pub async fn prune_runs(&self, keep: u32) -> DbResult<u64> {
        self.repo.prune_runs(keep).await
    }
}
