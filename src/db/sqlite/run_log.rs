use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::parse_enum;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::RunLogRepo,
    },
    models::{AppliedAction, LogEntry, NewLogEntry, RunRecord, RunStatus},
};

pub struct SqliteRunLogRepo {
    pool: SqlitePool,
}

impl SqliteRunLogRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn run_from_row(row: &SqliteRow) -> DbResult<RunRecord> {
        Ok(RunRecord {
            id: row.try_get("id")?,
            started_at: row.try_get("time")?,
            status: parse_enum(&row.try_get::<String, _>("status")?)?,
            message: row.try_get("message")?,
        })
    }

    fn log_from_row(row: &SqliteRow) -> DbResult<LogEntry> {
        let actions_json: String = row.try_get("actions")?;
        let actions: Vec<AppliedAction> = serde_json::from_str(&actions_json)?;

        Ok(LogEntry {
            id: row.try_get("id")?,
            time: row.try_get("time")?,
            category_id: row.try_get("category_id")?,
            category_label: row.try_get("category_label")?,
            record_id: row.try_get("record_id")?,
            record_created_at: row.try_get("record_created_at")?,
            status: parse_enum(&row.try_get::<String, _>("status")?)?,
            actions,
            message: row.try_get("message")?,
        })
    }
}

#[async_trait]
impl RunLogRepo for SqliteRunLogRepo {
    async fn create_run(&self, started_at: DateTime<Utc>, message: &str) -> DbResult<RunRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO retention_runs (time, status, message)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(started_at)
        .bind(RunStatus::Running.to_string())
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(RunRecord {
            id: result.last_insert_rowid(),
            started_at,
            status: RunStatus::Running,
            message: message.to_string(),
        })
    }

    async fn finish_run(&self, id: i64, status: RunStatus, message: &str) -> DbResult<()> {
        if !status.is_terminal() {
            return Err(DbError::Conflict(format!(
                "run {} cannot be finished with status '{}'",
                id, status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE retention_runs
            SET status = ?, message = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.to_string())
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT status FROM retention_runs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            None => Err(DbError::NotFound),
            Some(current) => Err(DbError::Conflict(format!(
                "run {} already finished with status '{}'",
                id, current
            ))),
        }
    }

    async fn expire_stale_runs(
        &self,
        started_before: DateTime<Utc>,
        marker: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE retention_runs
            SET status = 'error', message = message || ?
            WHERE status = 'running' AND time < ?
            "#,
        )
        .bind(marker)
        .bind(started_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_active_run(&self) -> DbResult<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, time, status, message
            FROM retention_runs
            WHERE status = 'running'
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::run_from_row).transpose()
    }

    async fn list_runs(&self, limit: u32) -> DbResult<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, time, status, message
            FROM retention_runs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::run_from_row).collect()
    }

    async fn prune_runs(&self, keep: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM retention_runs
            WHERE status != 'running'
              AND id NOT IN (
                SELECT id FROM retention_runs
                ORDER BY id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn create_log(&self, input: NewLogEntry) -> DbResult<LogEntry> {
        let actions_json = serde_json::to_string(&input.actions)?;

        let result = sqlx::query(
            r#"
            INSERT INTO retention_log (
                time, category_id, category_label, record_id,
                record_created_at, status, actions, message
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.time)
        .bind(&input.category_id)
        .bind(&input.category_label)
        .bind(input.record_id)
        .bind(input.record_created_at)
        .bind(input.status.to_string())
        .bind(&actions_json)
        .bind(&input.message)
        .execute(&self.pool)
        .await?;

        Ok(LogEntry {
            id: result.last_insert_rowid(),
            time: input.time,
            category_id: input.category_id,
            category_label: input.category_label,
            record_id: input.record_id,
            record_created_at: input.record_created_at,
            status: input.status,
            actions: input.actions,
            message: input.message,
        })
    }

    async fn list_logs(&self, limit: u32) -> DbResult<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, time, category_id, category_label, record_id,
                   record_created_at, status, actions, message
            FROM retention_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::log_from_row).collect()
    }

    async fn count_logs(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM retention_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn prune_logs(&self, keep: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM retention_log
            WHERE id NOT IN (
                SELECT id FROM retention_log
                ORDER BY id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
