use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::parse_enum;
use crate::{
    db::{
        error::DbResult,
        repos::{OverdueQuery, RecordStore},
    },
    models::{Category, Record, RecordStatus},
};

/// Shared filter for `query_overdue` and `count_overdue`.
///
/// A file field counts when `normalize_field_value` would extract at least
/// one reference from it: a non-blank string, or a JSON array holding a
/// non-blank string at any depth.
///
/// Binds, in order: category_id, cutoff, include_trash, require_files, after_id.
const OVERDUE_FILTER: &str = r#"
    r.category_id = ?
    AND r.created_at < ?
    AND (? OR r.status != 'trash')
    AND (
        NOT ?
        OR EXISTS (
            SELECT 1
            FROM record_fields f
            JOIN category_file_fields c
              ON c.category_id = r.category_id AND c.field_key = f.field_key
            WHERE f.record_id = r.id
              AND f.value IS NOT NULL
              AND CASE
                  WHEN trim(f.value) = '' THEN 0
                  WHEN substr(trim(f.value), 1, 1) = '[' AND json_valid(trim(f.value)) THEN
                      EXISTS (
                          SELECT 1
                          FROM json_tree(trim(f.value)) j
                          WHERE j.type = 'text' AND trim(j.atom) != ''
                      )
                  ELSE 1
              END
        )
    )
    AND r.id > ?
"#;

/// Record store backed by the reference host schema
/// (`categories`, `category_file_fields`, `records`, `record_fields`).
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &SqliteRow) -> DbResult<Record> {
        Ok(Record {
            id: row.try_get("id")?,
            category_id: row.try_get("category_id")?,
            created_at: row.try_get("created_at")?,
            status: parse_enum::<RecordStatus>(&row.try_get::<String, _>("status")?)?,
        })
    }

    /// Insert or rename a category. Categories are listed by `position`.
    pub async fn upsert_category(&self, category: &Category, position: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, label, position)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET label = excluded.label, position = excluded.position
            "#,
        )
        .bind(&category.id)
        .bind(&category.label)
        .bind(position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Declare a field of a category as file-bearing.
    pub async fn add_file_field(&self, category_id: &str, field_key: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO category_file_fields (category_id, field_key)
            VALUES (?, ?)
            "#,
        )
        .bind(category_id)
        .bind(field_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_record(
        &self,
        category_id: &str,
        created_at: DateTime<Utc>,
        status: &RecordStatus,
    ) -> DbResult<Record> {
        let result = sqlx::query(
            r#"
            INSERT INTO records (category_id, created_at, status)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(category_id)
        .bind(created_at)
        .bind(status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(Record {
            id: result.last_insert_rowid(),
            category_id: category_id.to_string(),
            created_at,
            status: status.clone(),
        })
    }

    /// Store a raw field value: a path, a URL, or a JSON-encoded array of them.
    pub async fn set_field_value(&self, record_id: i64, field_key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO record_fields (record_id, field_key, value)
            VALUES (?, ?, ?)
            ON CONFLICT (record_id, field_key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(record_id)
        .bind(field_key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_record(&self, record_id: i64) -> DbResult<Option<Record>> {
        let row = sqlx::query(
            r#"
            SELECT id, category_id, created_at, status
            FROM records
            WHERE id = ?
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn list_categories(&self) -> DbResult<Vec<Category>> {
        let rows = sqlx::query(
            r#"
            SELECT id, label
            FROM categories
            ORDER BY position ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Category {
                    id: row.try_get("id")?,
                    label: row.try_get("label")?,
                })
            })
            .collect()
    }

    async fn query_overdue(&self, query: &OverdueQuery) -> DbResult<Vec<Record>> {
        let sql = format!(
            r#"
            SELECT r.id, r.category_id, r.created_at, r.status
            FROM records r
            WHERE {}
            ORDER BY r.id ASC
            LIMIT ?
            "#,
            OVERDUE_FILTER
        );

        let rows = sqlx::query(&sql)
            .bind(&query.category_id)
            .bind(query.cutoff)
            .bind(query.include_trash)
            .bind(query.require_files)
            .bind(query.after_id.unwrap_or(i64::MIN))
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn count_overdue(&self, query: &OverdueQuery) -> DbResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM records r WHERE {}",
            OVERDUE_FILTER
        );

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&query.category_id)
            .bind(query.cutoff)
            .bind(query.include_trash)
            .bind(query.require_files)
            .bind(query.after_id.unwrap_or(i64::MIN))
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn soft_delete(&self, record_id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET status = 'trash'
            WHERE id = ? AND status != 'trash'
            "#,
        )
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn hard_delete(&self, record_id: i64) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM record_fields WHERE record_id = ?")
            .bind(record_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(record_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_file_fields(&self, category_id: &str) -> DbResult<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT field_key
            FROM category_file_fields
            WHERE category_id = ?
            ORDER BY field_key ASC
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn get_field_value(
        &self,
        record_id: i64,
        field_key: &str,
    ) -> DbResult<Option<serde_json::Value>> {
        let value: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT value
            FROM record_fields
            WHERE record_id = ? AND field_key = ?
            "#,
        )
        .bind(record_id)
        .bind(field_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.flatten().map(serde_json::Value::String))
    }
}
