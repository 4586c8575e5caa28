//! Retention rules configuration.
//!
//! Decides what happens to records (and their attached files) once they are
//! older than the retention window of their category.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! record_disposition = "soft_delete"
//! file_disposition = "delete"
//! global_retention_days = 365
//! log_limit = 256
//!
//! [retention.schedule]
//! enabled = true
//! hour = 3
//! utc_offset = "+02:00"
//!
//! [retention.categories.contact-form]
//! mode = "custom"
//! days = 30
//!
//! [retention.categories.job-applications]
//! mode = "never"
//! ```

use std::collections::BTreeMap;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Retention window applied when a category has no rule, and the fallback
/// for custom rules with an invalid day count.
pub const DEFAULT_RETENTION_DAYS: u32 = 365;

/// Smallest audit log size the engine will prune down to.
pub const MIN_LOG_LIMIT: u32 = 10;

/// What happens to an overdue record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordDisposition {
    /// Leave the record in place.
    #[default]
    Keep,
    /// Move the record to the host's trash.
    SoftDelete,
    /// Permanently delete the record, including records already in the trash.
    HardDelete,
}

impl std::fmt::Display for RecordDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordDisposition::Keep => write!(f, "keep"),
            RecordDisposition::SoftDelete => write!(f, "soft_delete"),
            RecordDisposition::HardDelete => write!(f, "hard_delete"),
        }
    }
}

/// What happens to the files attached to an overdue record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileDisposition {
    #[default]
    Keep,
    Delete,
}

impl std::fmt::Display for FileDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileDisposition::Keep => write!(f, "keep"),
            FileDisposition::Delete => write!(f, "delete"),
        }
    }
}

/// How a category's retention window is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    /// Use `global_retention_days`.
    #[default]
    Global,
    /// Never retire records of this category.
    Never,
    /// Use the rule's own `days`.
    Custom,
}

/// Per-category retention rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryRule {
    #[serde(default)]
    pub mode: RuleMode,

    /// Only read when `mode = "custom"`. Values below 1 fall back to
    /// [`DEFAULT_RETENTION_DAYS`].
    #[serde(default)]
    pub days: i64,
}

/// Retention settings.
///
/// Supplied by the caller for each invocation; the engine never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSettings {
    /// Action taken on overdue records.
    /// Default: keep
    #[serde(default)]
    pub record_disposition: RecordDisposition,

    /// Action taken on files attached to overdue records.
    /// Default: keep
    #[serde(default)]
    pub file_disposition: FileDisposition,

    /// Retention window for categories using the global rule.
    /// Default: 365 days
    #[serde(default = "default_global_retention_days")]
    pub global_retention_days: u32,

    /// Per-category rules, keyed by category id.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryRule>,

    /// Number of audit log entries to keep.
    /// Default: 256, minimum 10
    #[serde(default = "default_log_limit")]
    pub log_limit: u32,

    /// Daily schedule.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            record_disposition: RecordDisposition::default(),
            file_disposition: FileDisposition::default(),
            global_retention_days: default_global_retention_days(),
            categories: BTreeMap::new(),
            log_limit: default_log_limit(),
            schedule: ScheduleConfig::default(),
        }
    }
}

fn default_global_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

fn default_log_limit() -> u32 {
    256
}

/// Daily schedule for unattended runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Whether scheduled runs do anything.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// Hour of day (0-23) at which the daily run fires.
    /// Default: 3
    #[serde(default = "default_hour")]
    pub hour: u32,

    /// Offset of the host's time zone, e.g. "+02:00". The hour is
    /// interpreted in this zone.
    /// Default: "+00:00"
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,

    /// Delay before a follow-up run when a scheduled run stopped at the time
    /// limit with work left over.
    /// Default: 60
    #[serde(default = "default_continuation_delay_secs")]
    pub continuation_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: default_hour(),
            utc_offset: default_utc_offset(),
            continuation_delay_secs: default_continuation_delay_secs(),
        }
    }
}

fn default_hour() -> u32 {
    3
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

fn default_continuation_delay_secs() -> u64 {
    60
}

impl ScheduleConfig {
    /// Parse `utc_offset` into a chrono offset.
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset.parse::<FixedOffset>().map_err(|_| {
            ConfigError::Validation(format!(
                "retention.schedule.utc_offset must look like \"+HH:MM\", got \"{}\"",
                self.utc_offset
            ))
        })
    }

    pub fn continuation_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.continuation_delay_secs)
    }
}

impl RetentionSettings {
    /// Whether any disposition would change something.
    pub fn has_any_action(&self) -> bool {
        self.record_disposition != RecordDisposition::Keep
            || self.file_disposition != FileDisposition::Keep
    }

    /// Apply load-time defaults and reject settings that cannot be repaired.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.global_retention_days < 1 {
            tracing::warn!(
                configured = self.global_retention_days,
                fallback = DEFAULT_RETENTION_DAYS,
                "retention.global_retention_days must be at least 1, using the default"
            );
            self.global_retention_days = DEFAULT_RETENTION_DAYS;
        }

        if self.log_limit < MIN_LOG_LIMIT {
            tracing::warn!(
                configured = self.log_limit,
                minimum = MIN_LOG_LIMIT,
                "retention.log_limit is below the minimum, raising it"
            );
            self.log_limit = MIN_LOG_LIMIT;
        }

        if self.schedule.hour > 23 {
            return Err(ConfigError::Validation(format!(
                "retention.schedule.hour must be between 0 and 23, got {}",
                self.schedule.hour
            )));
        }

        self.schedule.offset()?;

        Ok(())
    }
}
