use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{Category, Record},
};

/// Selection of overdue records in one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverdueQuery {
    pub category_id: String,
    /// Records created strictly before this instant are overdue.
    pub cutoff: DateTime<Utc>,
    /// Include records in the trash state.
    pub include_trash: bool,
    /// Only records holding at least one non-empty file reference.
    pub require_files: bool,
    /// Only records with an id greater than this one. Results are ordered by
    /// id, so this acts as a keyset cursor.
    pub after_id: Option<i64>,
    /// Maximum number of records returned. Ignored when counting.
    pub limit: u32,
}

/// Read/mutate contract the host application provides to the engine.
///
/// The engine never caches what it reads here beyond one batch. Hosts decide
/// how deletion is carried out; a `false` or an error from `soft_delete` /
/// `hard_delete` is recorded as a failure for that record only.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every category, in a stable order.
    async fn list_categories(&self) -> DbResult<Vec<Category>>;

    /// Overdue records, ordered by id ascending.
    async fn query_overdue(&self, query: &OverdueQuery) -> DbResult<Vec<Record>>;

    /// Number of records `query_overdue` would select without a limit.
    async fn count_overdue(&self, query: &OverdueQuery) -> DbResult<u64>;

    /// Move a record to the trash.
    async fn soft_delete(&self, record_id: i64) -> DbResult<bool>;

    /// Permanently delete a record.
    async fn hard_delete(&self, record_id: i64) -> DbResult<bool>;

    /// Keys of the file-bearing fields of a category.
    async fn list_file_fields(&self, category_id: &str) -> DbResult<Vec<String>>;

    /// Raw stored value of a field, if the record has one.
    async fn get_field_value(
        &self,
        record_id: i64,
        field_key: &str,
    ) -> DbResult<Option<serde_json::Value>>;
}
