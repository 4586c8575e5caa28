//! Shared tests for RunLogRepo implementations

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    db::{DbError, repos::RunLogRepo},
    models::{AppliedAction, LogStatus, NewLogEntry, RunStatus},
};

// ============================================================================
// Test Input Helpers
// ============================================================================

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn log_input(record_id: i64, status: LogStatus, actions: Vec<AppliedAction>) -> NewLogEntry {
    NewLogEntry {
        time: base_time(),
        category_id: "contact".to_string(),
        category_label: "Contact form".to_string(),
        record_id,
        record_created_at: base_time() - Duration::days(400),
        status,
        actions,
        message: format!("record {}", record_id),
    }
}

pub struct RunLogTestContext<'a> {
    pub repo: &'a dyn RunLogRepo,
}

// ============================================================================
// Run Tests
// ============================================================================

pub async fn test_create_run(ctx: &RunLogTestContext<'_>) {
    let run = ctx
        .repo
        .create_run(base_time(), "Manual run")
        .await
        .expect("Failed to create run");

    assert!(run.id > 0);
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.message, "Manual run");

    let active = ctx.repo.find_active_run().await.unwrap().unwrap();
    assert_eq!(active.id, run.id);
    assert_eq!(active.started_at, base_time());
}

pub async fn test_finish_run(ctx: &RunLogTestContext<'_>) {
    let run = ctx.repo.create_run(base_time(), "").await.unwrap();

    ctx.repo
        .finish_run(run.id, RunStatus::Warning, "Processed 3 entries (1 warnings).")
        .await
        .expect("Failed to finish run");

    let runs = ctx.repo.list_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Warning);
    assert_eq!(runs[0].message, "Processed 3 entries (1 warnings).");
    assert!(ctx.repo.find_active_run().await.unwrap().is_none());
}

pub async fn test_finish_run_twice_conflicts(ctx: &RunLogTestContext<'_>) {
    let run = ctx.repo.create_run(base_time(), "").await.unwrap();
    ctx.repo
        .finish_run(run.id, RunStatus::Success, "done")
        .await
        .unwrap();

    let result = ctx.repo.finish_run(run.id, RunStatus::Error, "again").await;
    assert!(matches!(result, Err(DbError::Conflict(_))));

    let runs = ctx.repo.list_runs(10).await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Success);
}

pub async fn test_finish_run_not_found(ctx: &RunLogTestContext<'_>) {
    let result = ctx.repo.finish_run(999, RunStatus::Success, "").await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

pub async fn test_finish_run_rejects_running(ctx: &RunLogTestContext<'_>) {
    let run = ctx.repo.create_run(base_time(), "").await.unwrap();
    let result = ctx.repo.finish_run(run.id, RunStatus::Running, "").await;
    assert!(matches!(result, Err(DbError::Conflict(_))));
}

pub async fn test_expire_stale_runs(ctx: &RunLogTestContext<'_>) {
    let stale = ctx
        .repo
        .create_run(base_time() - Duration::hours(2), "Scheduled run")
        .await
        .unwrap();
    let fresh = ctx
        .repo
        .create_run(base_time() - Duration::minutes(5), "Manual run")
        .await
        .unwrap();

    let expired = ctx
        .repo
        .expire_stale_runs(base_time() - Duration::hours(1), " [Timeout]")
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let runs = ctx.repo.list_runs(10).await.unwrap();
    let stale_row = runs.iter().find(|r| r.id == stale.id).unwrap();
    assert_eq!(stale_row.status, RunStatus::Error);
    assert_eq!(stale_row.message, "Scheduled run [Timeout]");

    let fresh_row = runs.iter().find(|r| r.id == fresh.id).unwrap();
    assert_eq!(fresh_row.status, RunStatus::Running);
}

pub async fn test_list_runs_newest_first(ctx: &RunLogTestContext<'_>) {
    for i in 0..3 {
        let run = ctx
            .repo
            .create_run(base_time() + Duration::minutes(i), &format!("run {}", i))
            .await
            .unwrap();
        ctx.repo
            .finish_run(run.id, RunStatus::Success, "")
            .await
            .unwrap();
    }

    let runs = ctx.repo.list_runs(2).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].id > runs[1].id);
}

pub async fn test_prune_runs_keeps_running(ctx: &RunLogTestContext<'_>) {
    let oldest = ctx.repo.create_run(base_time(), "stuck").await.unwrap();
    for i in 1..=5 {
        let run = ctx
            .repo
            .create_run(base_time() + Duration::minutes(i), "")
            .await
            .unwrap();
        ctx.repo
            .finish_run(run.id, RunStatus::Success, "")
            .await
            .unwrap();
    }

    let pruned = ctx.repo.prune_runs(2).await.unwrap();
    assert_eq!(pruned, 3);

    let runs = ctx.repo.list_runs(10).await.unwrap();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().any(|r| r.id == oldest.id));
}

// ============================================================================
// Log Tests
// ============================================================================

pub async fn test_create_and_list_logs(ctx: &RunLogTestContext<'_>) {
    let entry = ctx
        .repo
        .create_log(log_input(
            7,
            LogStatus::Warning,
            vec![AppliedAction::Trash, AppliedAction::Warning],
        ))
        .await
        .expect("Failed to create log");

    assert!(entry.id > 0);

    let logs = ctx.repo.list_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].record_id, 7);
    assert_eq!(logs[0].status, LogStatus::Warning);
    assert_eq!(
        logs[0].actions,
        vec![AppliedAction::Trash, AppliedAction::Warning]
    );
    assert_eq!(logs[0].category_label, "Contact form");
    assert_eq!(logs[0].record_created_at, base_time() - Duration::days(400));
}

pub async fn test_log_with_no_actions(ctx: &RunLogTestContext<'_>) {
    ctx.repo
        .create_log(log_input(1, LogStatus::Skipped, vec![]))
        .await
        .unwrap();

    let logs = ctx.repo.list_logs(10).await.unwrap();
    assert!(logs[0].actions.is_empty());
}

pub async fn test_prune_logs_keeps_newest(ctx: &RunLogTestContext<'_>) {
    for id in 1..=15 {
        ctx.repo
            .create_log(log_input(id, LogStatus::Success, vec![AppliedAction::Delete]))
            .await
            .unwrap();
    }

    let pruned = ctx.repo.prune_logs(10).await.unwrap();
    assert_eq!(pruned, 5);
    assert_eq!(ctx.repo.count_logs().await.unwrap(), 10);

    let logs = ctx.repo.list_logs(100).await.unwrap();
    let mut record_ids: Vec<i64> = logs.iter().map(|l| l.record_id).collect();
    record_ids.sort();
    assert_eq!(record_ids, (6..=15).collect::<Vec<_>>());
}

pub async fn test_prune_logs_below_limit(ctx: &RunLogTestContext<'_>) {
    for id in 1..=3 {
        ctx.repo
            .create_log(log_input(id, LogStatus::Success, vec![]))
            .await
            .unwrap();
    }

    assert_eq!(ctx.repo.prune_logs(10).await.unwrap(), 0);
    assert_eq!(ctx.repo.count_logs().await.unwrap(), 3);
}

// ============================================================================
// SQLite Tests - Fast, in-memory
// ============================================================================

#[cfg(all(test, feature = "database-sqlite"))]
mod sqlite_tests {
    use super::*;
    use crate::db::{sqlite::SqliteRunLogRepo, tests::harness::migrated_sqlite_pool};

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let repo = SqliteRunLogRepo::new(migrated_sqlite_pool().await);
                let ctx = RunLogTestContext { repo: &repo };
                super::$name(&ctx).await;
            }
        };
    }

    // Run tests
    sqlite_test!(test_create_run);
    sqlite_test!(test_finish_run);
    sqlite_test!(test_finish_run_twice_conflicts);
    sqlite_test!(test_finish_run_not_found);
    sqlite_test!(test_finish_run_rejects_running);
    sqlite_test!(test_expire_stale_runs);
    sqlite_test!(test_list_runs_newest_first);
    sqlite_test!(test_prune_runs_keeps_running);

    // Log tests
    sqlite_test!(test_create_and_list_logs);
    sqlite_test!(test_log_with_no_actions);
    sqlite_test!(test_prune_logs_keeps_newest);
    sqlite_test!(test_prune_logs_below_limit);
}
