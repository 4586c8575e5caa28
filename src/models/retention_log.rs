use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Warning,
    Error,
    Skipped,
}

impl RunStatus {
    /// Whether this status ends a run. A run leaves `Running` exactly once.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Success => write!(f, "success"),
            RunStatus::Warning => write!(f, "warning"),
            RunStatus::Error => write!(f, "error"),
            RunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "warning" => Ok(RunStatus::Warning),
            "error" => Ok(RunStatus::Error),
            "skipped" => Ok(RunStatus::Skipped),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

/// Outcome of processing a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Skipped,
    Success,
    Warning,
    Error,
}

impl From<LogStatus> for RunStatus {
    fn from(status: LogStatus) -> Self {
        match status {
            LogStatus::Skipped => RunStatus::Skipped,
            LogStatus::Success => RunStatus::Success,
            LogStatus::Warning => RunStatus::Warning,
            LogStatus::Error => RunStatus::Error,
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        RunStatus::from(*self).fmt(f)
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogStatus::Success),
            "warning" => Ok(LogStatus::Warning),
            "error" => Ok(LogStatus::Error),
            "skipped" => Ok(LogStatus::Skipped),
            _ => Err(format!("Invalid log status: {}", s)),
        }
    }
}

/// An action applied to a record, kept apart from the free-text message so
/// that presentation layers can highlight it without parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedAction {
    /// The record was permanently deleted
    Delete,
    /// The record was moved to the trash
    Trash,
    /// Attached files were removed from disk
    Files,
    /// Some attached files could not be removed
    Warning,
    /// Nothing was done
    Skip,
}

impl AppliedAction {
    /// Bracketed tag for plain-text output, e.g. `[TRASH]`.
    pub fn tag(&self) -> &'static str {
        match self {
            AppliedAction::Delete => "[DELETE]",
            AppliedAction::Trash => "[TRASH]",
            AppliedAction::Files => "[FILES]",
            AppliedAction::Warning => "[WARNING]",
            AppliedAction::Skip => "[SKIP]",
        }
    }
}

/// One invocation of the batch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub message: String,
}

/// One processed record in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub category_id: String,
    pub category_label: String,
    pub record_id: i64,
    pub record_created_at: DateTime<Utc>,
    pub status: LogStatus,
    pub actions: Vec<AppliedAction>,
    pub message: String,
}

impl LogEntry {
    /// Message prefixed with the action tags, as shown by the CLI.
    pub fn tagged_message(&self) -> String {
        let tags: String = self.actions.iter().map(AppliedAction::tag).collect();
        if tags.is_empty() {
            self.message.clone()
        } else {
            format!("{} {}", tags, self.message)
        }
    }
}

/// Input for appending an audit log entry
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub time: DateTime<Utc>,
    pub category_id: String,
    pub category_label: String,
    pub record_id: i64,
    pub record_created_at: DateTime<Utc>,
    pub status: LogStatus,
    pub actions: Vec<AppliedAction>,
    pub message: String,
}
