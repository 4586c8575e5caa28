//! The batch engine.
//!
//! One invocation opens a run, then makes passes over every non-exempt
//! category, pulling at most `batch_limit` overdue records per category per
//! pass. Passes repeat until one processes nothing or the time budget is
//! spent; in the latter case the summary reports `has_more` and the caller
//! re-invokes. Per-record and per-file failures are written to the audit log
//! and folded into the run status, never returned.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{
    clock::Clock,
    error::{RetentionError, RetentionResult},
    estimate::{Estimate, EstimateScope, estimate},
    files::{FileCleanup, FileDeleter},
    rules::resolve_days,
    run_log::RunLogger,
};
use crate::{
    config::{FileDisposition, MIN_LOG_LIMIT, RecordDisposition, RetentionSettings},
    db::{OverdueQuery, RecordStore, RunLogRepo},
    models::{AppliedAction, Category, LogStatus, Record, RunStatus},
    observability::metrics,
};

/// Records pulled per category per pass.
pub const BATCH_LIMIT: u32 = 50;

/// Wall-clock budget of one invocation, checked between categories.
pub const TIME_LIMIT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub batch_limit: u32,
    pub time_limit: Duration,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            batch_limit: BATCH_LIMIT,
            time_limit: TIME_LIMIT,
        }
    }
}

/// What started an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    fn run_message(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "Scheduled run",
            Trigger::Manual => "Manual run",
        }
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub processed: u32,
    /// The time budget ran out; invoke again to continue.
    pub has_more: bool,
    pub warnings: u32,
    pub errors: u32,
}

/// Per-invocation mutable state.
#[derive(Default)]
struct RunState {
    processed: u32,
    warnings: u32,
    errors: u32,
    time_limited: bool,
    /// Highest record id seen per category. Records that survive processing
    /// are not selected again within the invocation.
    cursors: HashMap<String, i64>,
    /// File-bearing field keys per category, read on first use.
    file_fields: HashMap<String, Vec<String>>,
    /// Categories whose selection failed; skipped for the rest of the run.
    failed_categories: HashSet<String>,
}

impl RunState {
    fn final_status(&self) -> RunStatus {
        if self.errors > 0 {
            RunStatus::Error
        } else if self.warnings > 0 {
            RunStatus::Warning
        } else {
            RunStatus::Success
        }
    }

    fn summary_message(&self) -> String {
        let mut message = format!("Processed {} entries.", self.processed);
        if self.warnings > 0 || self.errors > 0 {
            message.push_str(&format!(
                " {} warnings, {} errors.",
                self.warnings, self.errors
            ));
        }
        if self.time_limited {
            message.push_str(" Time limit reached, the run is partial and will be resumed.");
        }
        message
    }
}

/// Outcome of one record, before it is written to the audit log.
struct RecordOutcome {
    status: LogStatus,
    actions: Vec<AppliedAction>,
    message: String,
}

/// Retires overdue records and their files.
///
/// Invocations are mutually exclusive, both within the process and, through
/// the run history, across processes sharing the same database.
pub struct RetentionEngine {
    records: Arc<dyn RecordStore>,
    run_logs: Arc<dyn RunLogRepo>,
    files: FileDeleter,
    clock: Arc<dyn Clock>,
    limits: EngineLimits,
    lock: Mutex<()>,
}

impl RetentionEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        run_logs: Arc<dyn RunLogRepo>,
        files: FileDeleter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records,
            run_logs,
            files,
            clock,
            limits: EngineLimits::default(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Timer entry point. Skips when scheduling is disabled.
    pub async fn run_scheduled(&self, settings: &RetentionSettings) -> RetentionResult<RunSummary> {
        self.run(Trigger::Scheduled, settings).await
    }

    /// User entry point. The caller re-invokes while `has_more` is set.
    pub async fn run_manual(&self, settings: &RetentionSettings) -> RetentionResult<RunSummary> {
        self.run(Trigger::Manual, settings).await
    }

    /// Invoke manually until a run reports no remaining work.
    pub async fn run_manual_until_done(
        &self,
        settings: &RetentionSettings,
    ) -> RetentionResult<Vec<RunSummary>> {
        let mut summaries = Vec::new();
        loop {
            let summary = self.run_manual(settings).await?;
            let has_more = summary.has_more;
            summaries.push(summary);
            if !has_more {
                return Ok(summaries);
            }
        }
    }

    /// Read-only preview of what a run would touch.
    pub async fn estimate(
        &self,
        settings: &RetentionSettings,
        scope: EstimateScope,
    ) -> RetentionResult<Estimate> {
        Ok(estimate(self.records.as_ref(), settings, scope, self.clock.now()).await?)
    }

    #[instrument(skip_all, fields(trigger = ?trigger))]
    async fn run(&self, trigger: Trigger, settings: &RetentionSettings) -> RetentionResult<RunSummary> {
        let Ok(_guard) = self.lock.try_lock() else {
            let run_id = self
                .run_logs
                .find_active_run()
                .await?
                .map(|r| r.id)
                .unwrap_or_default();
            return Err(RetentionError::RunInProgress { run_id });
        };

        if let Some(reason) = skip_reason(trigger, settings) {
            return self.skip(trigger, reason).await;
        }

        let categories = self.records.list_categories().await?;
        let logger = RunLogger::new(self.run_logs.clone(), self.clock.clone())
            .with_labels(&categories);
        let run = logger.start_run(trigger.run_message()).await?;

        info!(
            run_id = run.id,
            record_disposition = %settings.record_disposition,
            file_disposition = %settings.file_disposition,
            categories = categories.len(),
            "Retention run started"
        );

        let now = self.clock.now();
        let plan: Vec<(Category, chrono::DateTime<chrono::Utc>)> = categories
            .into_iter()
            .filter_map(|c| {
                let cutoff = resolve_days(settings, &c.id).cutoff(now)?;
                Some((c, cutoff))
            })
            .collect();

        let mut state = RunState::default();
        let started = Instant::now();

        loop {
            let pass_processed = self
                .run_pass(&plan, settings, &logger, &mut state, started)
                .await;
            debug!(run_id = run.id, pass_processed, "Retention pass complete");
            if state.time_limited || pass_processed == 0 {
                break;
            }
        }

        let status = state.final_status();
        let message = state.summary_message();
        if let Err(e) = logger.finish_run(run.id, status, &message).await {
            warn!(run_id = run.id, error = %e, "Failed to close retention run");
        }
        if let Err(e) = logger.prune_logs(settings.log_limit.max(MIN_LOG_LIMIT)).await {
            warn!(run_id = run.id, error = %e, "Failed to prune retention log");
        }
        metrics::record_retention_run(&status.to_string(), state.processed);

        Ok(RunSummary {
            run_id: run.id,
            status,
            processed: state.processed,
            has_more: state.time_limited,
            warnings: state.warnings,
            errors: state.errors,
        })
    }

    async fn skip(&self, trigger: Trigger, reason: &str) -> RetentionResult<RunSummary> {
        let logger = RunLogger::new(self.run_logs.clone(), self.clock.clone());
        let run = logger.start_run(trigger.run_message()).await?;
        if let Err(e) = logger.finish_run(run.id, RunStatus::Skipped, reason).await {
            warn!(run_id = run.id, error = %e, "Failed to close skipped retention run");
        }
        metrics::record_retention_run(&RunStatus::Skipped.to_string(), 0);

        Ok(RunSummary {
            run_id: run.id,
            status: RunStatus::Skipped,
            processed: 0,
            has_more: false,
            warnings: 0,
            errors: 0,
        })
    }

    /// One pass over every planned category. Returns the records processed.
    async fn run_pass(
        &self,
        plan: &[(Category, chrono::DateTime<chrono::Utc>)],
        settings: &RetentionSettings,
        logger: &RunLogger,
        state: &mut RunState,
        started: Instant,
    ) -> u32 {
        let mut pass_processed = 0;

        for (category, cutoff) in plan {
            if state.failed_categories.contains(&category.id) {
                continue;
            }

            let query = OverdueQuery {
                category_id: category.id.clone(),
                cutoff: *cutoff,
                include_trash: settings.record_disposition == RecordDisposition::HardDelete,
                require_files: settings.record_disposition == RecordDisposition::Keep
                    && settings.file_disposition == FileDisposition::Delete,
                after_id: state.cursors.get(&category.id).copied(),
                limit: self.limits.batch_limit,
            };

            match self.records.query_overdue(&query).await {
                Ok(batch) => {
                    for record in &batch {
                        state.cursors.insert(category.id.clone(), record.id);
                        self.process_record(record, settings, logger, state).await;
                        pass_processed += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        category_id = %category.id,
                        error = %e,
                        "Failed to select overdue records"
                    );
                    state.failed_categories.insert(category.id.clone());
                    state.errors += 1;
                }
            }

            // The budget only stops a run that has made progress
            if state.processed > 0 && started.elapsed() >= self.limits.time_limit {
                info!(
                    processed = state.processed,
                    "Retention time limit reached, stopping pass"
                );
                state.time_limited = true;
                break;
            }
        }

        pass_processed
    }

    /// Apply the configured dispositions to one record and log the outcome.
    async fn process_record(
        &self,
        record: &Record,
        settings: &RetentionSettings,
        logger: &RunLogger,
        state: &mut RunState,
    ) {
        let mut files = FileCleanup::default();
        if settings.file_disposition == FileDisposition::Delete {
            match self.file_fields(&record.category_id, state).await {
                Some(fields) => {
                    files = self
                        .files
                        .cleanup_files(self.records.as_ref(), record, &fields)
                        .await;
                }
                None => files.errors += 1,
            }
            metrics::record_retention_files(files.deleted, files.errors);
        }

        let outcome = self
            .apply_record_disposition(record, settings, files)
            .await;

        match outcome.status {
            LogStatus::Error => state.errors += 1,
            LogStatus::Warning => state.warnings += 1,
            LogStatus::Success | LogStatus::Skipped => {}
        }
        state.processed += 1;
        metrics::record_retention_record(&outcome.status.to_string());

        debug!(
            record_id = record.id,
            category_id = %record.category_id,
            status = %outcome.status,
            files_deleted = files.deleted,
            file_errors = files.errors,
            "Processed record"
        );

        if let Err(e) = logger
            .log(record, outcome.status, outcome.actions, outcome.message)
            .await
        {
            warn!(record_id = record.id, error = %e, "Failed to write retention log entry");
        }
    }

    async fn apply_record_disposition(
        &self,
        record: &Record,
        settings: &RetentionSettings,
        files: FileCleanup,
    ) -> RecordOutcome {
        let mut actions = Vec::new();
        let mut status = LogStatus::Success;
        let mut message = String::new();

        match settings.record_disposition {
            RecordDisposition::HardDelete => match self.records.hard_delete(record.id).await {
                Ok(true) => {
                    actions.push(AppliedAction::Delete);
                    message.push_str("Record deleted permanently.");
                }
                Ok(false) => {
                    status = LogStatus::Error;
                    message.push_str("Record could not be deleted.");
                }
                Err(e) => {
                    status = LogStatus::Error;
                    message.push_str(&format!("Record could not be deleted: {}.", e));
                }
            },
            RecordDisposition::SoftDelete if record.status.is_trashed() => {
                message.push_str("Record already in trash.");
            }
            RecordDisposition::SoftDelete => match self.records.soft_delete(record.id).await {
                Ok(true) => {
                    actions.push(AppliedAction::Trash);
                    message.push_str("Record moved to trash.");
                }
                Ok(false) => {
                    status = LogStatus::Error;
                    message.push_str("Record could not be moved to trash.");
                }
                Err(e) => {
                    status = LogStatus::Error;
                    message.push_str(&format!("Record could not be moved to trash: {}.", e));
                }
            },
            RecordDisposition::Keep if settings.file_disposition == FileDisposition::Keep => {
                return RecordOutcome {
                    status: LogStatus::Skipped,
                    actions: vec![AppliedAction::Skip],
                    message: "Nothing to do.".to_string(),
                };
            }
            RecordDisposition::Keep => message.push_str("Record kept."),
        }

        if settings.file_disposition == FileDisposition::Delete {
            if files.deleted > 0 {
                actions.push(AppliedAction::Files);
            }
            message.push_str(&format!(" {} files deleted.", files.deleted));

            if files.errors > 0 {
                actions.push(AppliedAction::Warning);
                message.push_str(&format!(" {} files could not be deleted.", files.errors));
                if status == LogStatus::Success {
                    status = LogStatus::Warning;
                }
            }
        }

        RecordOutcome {
            status,
            actions,
            message,
        }
    }

    /// File-bearing fields of a category, memoized for the invocation.
    async fn file_fields(&self, category_id: &str, state: &mut RunState) -> Option<Vec<String>> {
        if let Some(fields) = state.file_fields.get(category_id) {
            return Some(fields.clone());
        }

        match self.records.list_file_fields(category_id).await {
            Ok(fields) => {
                state
                    .file_fields
                    .insert(category_id.to_string(), fields.clone());
                Some(fields)
            }
            Err(e) => {
                warn!(category_id, error = %e, "Failed to list file fields");
                None
            }
        }
    }
}

fn skip_reason(trigger: Trigger, settings: &RetentionSettings) -> Option<&'static str> {
    if trigger == Trigger::Scheduled && !settings.schedule.enabled {
        return Some("Scheduled runs are disabled.");
    }
    if !settings.has_any_action() {
        return Some("Record and file dispositions are both 'keep'.");
    }
    None
}
