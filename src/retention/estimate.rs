use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rules::resolve_days;
use crate::{
    config::{RecordDisposition, RetentionSettings},
    db::{DbResult, OverdueQuery, RecordStore},
};

/// What a dry run counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateScope {
    /// Every overdue record.
    #[default]
    Records,
    /// Overdue records holding at least one file reference.
    Files,
}

impl std::fmt::Display for EstimateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimateScope::Records => write!(f, "records"),
            EstimateScope::Files => write!(f, "files"),
        }
    }
}

impl std::str::FromStr for EstimateScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "records" => Ok(EstimateScope::Records),
            "files" => Ok(EstimateScope::Files),
            _ => Err(format!("Invalid estimate scope: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub count: u64,
    pub scope: EstimateScope,
}

/// Count what a run would touch, without mutating anything.
///
/// Trashed records only count when records are hard-deleted. In the `Files`
/// scope, categories without file-bearing fields are skipped.
pub async fn estimate(
    store: &dyn RecordStore,
    settings: &RetentionSettings,
    scope: EstimateScope,
    now: DateTime<Utc>,
) -> DbResult<Estimate> {
    let include_trash = settings.record_disposition == RecordDisposition::HardDelete;
    let mut count = 0u64;

    for category in store.list_categories().await? {
        let Some(cutoff) = resolve_days(settings, &category.id).cutoff(now) else {
            continue;
        };

        if scope == EstimateScope::Files
            && store.list_file_fields(&category.id).await?.is_empty()
        {
            continue;
        }

        let query = OverdueQuery {
            category_id: category.id,
            cutoff,
            include_trash,
            require_files: scope == EstimateScope::Files,
            after_id: None,
            limit: 0,
        };
        count += store.count_overdue(&query).await?;
    }

    Ok(Estimate { count, scope })
}
