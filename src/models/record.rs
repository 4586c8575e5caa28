use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A grouping of records that share one retention rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identifier used as the key of `retention.categories`
    pub id: String,
    /// Human-readable name, shown in the audit log
    pub label: String,
}

/// Lifecycle state of a record as reported by the host.
///
/// Hosts may use any number of live states; only the trash state matters to
/// the engine, so everything else is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// The default live state
    Active,
    /// Soft-deleted, recoverable by the host
    Trash,
    /// Any other host-defined state
    Other(String),
}

impl RecordStatus {
    pub fn is_trashed(&self) -> bool {
        matches!(self, RecordStatus::Trash)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Active => write!(f, "active"),
            RecordStatus::Trash => write!(f, "trash"),
            RecordStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err("Empty record status".to_string()),
            "active" => Ok(RecordStatus::Active),
            "trash" => Ok(RecordStatus::Trash),
            other => Ok(RecordStatus::Other(other.to_string())),
        }
    }
}

/// One retirable unit of data.
///
/// Records are owned by the host. The engine only holds them for the
/// duration of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub category_id: String,
    pub created_at: DateTime<Utc>,
    pub status: RecordStatus,
}

/// A stored pointer to an uploaded file: an absolute path, or a URL that maps
/// to a path under the upload root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileReference(String);

impl FileReference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract every file reference from a raw field value.
///
/// Hosts store file fields either as a plain string, as a JSON-encoded array
/// of strings, or as a native array (possibly nested for multi-file fields).
/// Empty strings and non-string scalars yield nothing.
pub fn normalize_field_value(value: &serde_json::Value) -> Vec<FileReference> {
    let mut refs = Vec::new();
    collect_references(value, &mut refs);
    refs
}

fn collect_references(value: &serde_json::Value, out: &mut Vec<FileReference>) {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return;
            }
            if trimmed.starts_with('[')
                && let Ok(inner @ serde_json::Value::Array(_)) =
                    serde_json::from_str::<serde_json::Value>(trimmed)
            {
                collect_references(&inner, out);
                return;
            }
            out.push(FileReference::new(trimmed));
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}
