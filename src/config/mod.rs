//! Configuration for the retention engine.
//!
//! Configuration is a TOML file, with support for environment variable
//! interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [database]
//! type = "sqlite"
//! path = "${LETHE_DATA}/lethe.db"
//!
//! [storage]
//! upload_root = "/var/www/uploads"
//!
//! [retention]
//! record_disposition = "soft_delete"
//! file_disposition = "delete"
//! ```

mod database;
mod observability;
mod retention;
mod storage;

use std::path::{Path, PathBuf};

pub use database::*;
pub use observability::*;
pub use retention::*;
use serde::{Deserialize, Serialize};
pub use storage::*;

/// Root configuration.
///
/// All sections are optional with sensible defaults. A configuration with
/// only defaults never changes anything: both dispositions default to keep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LetheConfig {
    /// Database holding the audit log, run history and (for the bundled
    /// store) the host records.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Upload directory that file deletion is confined to.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retention rules.
    #[serde(default)]
    pub retention: RetentionSettings,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl LetheConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        // Detect feature-gated values before typed deserialization so users get
        // an actionable message instead of serde's "unknown variant".
        let raw: toml::Value = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        check_disabled_features(&raw)?;

        let mut config: LetheConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration and apply load-time defaults.
    fn validate(&mut self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.storage.validate().map_err(ConfigError::Validation)?;
        self.retention.validate()?;
        self.observability
            .metrics
            .validate()
            .map_err(ConfigError::Validation)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Source of retention settings for one invocation.
///
/// The scheduler asks for fresh settings on every tick so that edits to the
/// configuration take effect without a restart.
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<RetentionSettings, ConfigError>;
}

impl SettingsSource for RetentionSettings {
    fn load(&self) -> Result<RetentionSettings, ConfigError> {
        Ok(self.clone())
    }
}

/// Re-reads the `[retention]` section of a configuration file on each load.
#[derive(Debug, Clone)]
pub struct FileSettingsSource {
    path: PathBuf,
}

impl FileSettingsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsSource for FileSettingsSource {
    fn load(&self) -> Result<RetentionSettings, ConfigError> {
        LetheConfig::from_file(&self.path).map(|c| c.retention)
    }
}

fn check_disabled_features(raw: &toml::Value) -> Result<(), ConfigError> {
    let mut issues: Vec<(String, &str)> = Vec::new();

    if let Some(type_val) = raw
        .get("database")
        .and_then(|v| v.get("type"))
        .and_then(|v| v.as_str())
    {
        check_database_feature(type_val, &mut issues);
    }

    if raw
        .get("observability")
        .and_then(|v| v.get("metrics"))
        .and_then(|v| v.get("enabled"))
        .and_then(|v| v.as_bool())
        == Some(true)
    {
        check_metrics_feature(&mut issues);
    }

    if issues.is_empty() {
        return Ok(());
    }

    let details = issues
        .iter()
        .map(|(msg, _)| msg.as_str())
        .collect::<Vec<_>>()
        .join("\n  - ");
    let features = issues
        .iter()
        .map(|(_, feat)| *feat)
        .collect::<Vec<_>>()
        .join(",");

    Err(ConfigError::Validation(format!(
        "Configuration requires features not compiled in this build:\n  \
         - {details}\n\n\
         Rebuild with: cargo build --features {features}"
    )))
}

fn check_database_feature(type_val: &str, _issues: &mut Vec<(String, &str)>) {
    match type_val {
        #[cfg(not(feature = "database-sqlite"))]
        "sqlite" => _issues.push((
            "database type 'sqlite' requires the 'database-sqlite' feature".into(),
            "database-sqlite",
        )),
        _ => {}
    }
}

fn check_metrics_feature(_issues: &mut Vec<(String, &str)>) {
    #[cfg(not(feature = "prometheus"))]
    _issues.push((
        "observability.metrics.enabled requires the 'prometheus' feature".into(),
        "prometheus",
    ));
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid interpolation pattern: {}", e)))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = LetheConfig::from_str("").unwrap();
        assert!(config.database.is_none());
        assert_eq!(config.storage.upload_root, "./uploads");
        assert!(!config.retention.has_any_action());
        assert!(!config.observability.metrics.enabled);
    }

    #[test]
    fn test_full_config() {
        let config = LetheConfig::from_str(
            r#"
            [storage]
            upload_root = "/srv/uploads"
            base_url = "https://example.com/uploads"

            [retention]
            record_disposition = "soft_delete"
            file_disposition = "delete"
            global_retention_days = 180

            [retention.categories.contact]
            mode = "custom"
            days = 30

            [observability.logging]
            level = "debug"
            format = "json"
        "#,
        )
        .unwrap();

        assert_eq!(config.storage.upload_root, "/srv/uploads");
        assert_eq!(
            config.retention.record_disposition,
            RecordDisposition::SoftDelete
        );
        assert_eq!(config.retention.global_retention_days, 180);
        assert_eq!(config.retention.categories["contact"].days, 30);
        assert_eq!(config.observability.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validation_is_applied_on_load() {
        let config = LetheConfig::from_str(
            r#"
            [retention]
            global_retention_days = 0
            log_limit = 1
        "#,
        )
        .unwrap();
        assert_eq!(config.retention.global_retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(config.retention.log_limit, MIN_LOG_LIMIT);

        let err = LetheConfig::from_str(
            r#"
            [retention.schedule]
            hour = 30
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = LetheConfig::from_str(
            r#"
            [providers.openai]
            type = "open_ai"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("LETHE_TEST_ROOT", Some("/srv/files"), || {
            let result = expand_env_vars("upload_root = \"${LETHE_TEST_ROOT}\"").unwrap();
            assert_eq!(result, "upload_root = \"/srv/files\"");
        });
    }

    #[test]
    fn test_env_var_missing() {
        temp_env::with_var_unset("LETHE_TEST_MISSING", || {
            let err = expand_env_vars("path = \"${LETHE_TEST_MISSING}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "LETHE_TEST_MISSING"));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# path = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# path = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_after_comment_ignored() {
        let result = expand_env_vars("key = \"value\" # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "key = \"value\" # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_multiline_with_comments() {
        temp_env::with_var("LETHE_TEST_MULTI", Some("value1"), || {
            let input = r#"key1 = "${LETHE_TEST_MULTI}"
# key2 = "${NONEXISTENT}"
key3 = "literal""#;
            let result = expand_env_vars(input).unwrap();
            assert_eq!(
                result,
                r#"key1 = "value1"
# key2 = "${NONEXISTENT}"
key3 = "literal""#
            );
        });
    }

    #[test]
    fn test_file_settings_source_reloads() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lethe.toml");
        std::fs::write(&path, "[retention]\nglobal_retention_days = 10\n").unwrap();

        let source = FileSettingsSource::new(&path);
        assert_eq!(source.load().unwrap().global_retention_days, 10);

        std::fs::write(&path, "[retention]\nglobal_retention_days = 20\n").unwrap();
        assert_eq!(source.load().unwrap().global_retention_days, 20);
    }

    #[test]
    fn test_file_settings_source_missing_file() {
        let source = FileSettingsSource::new("/nonexistent/lethe.toml");
        assert!(matches!(source.load(), Err(ConfigError::Io(_, _))));
    }

    #[cfg(feature = "database-sqlite")]
    #[test]
    fn test_sqlite_database_section() {
        let config = LetheConfig::from_str(
            r#"
            [database]
            type = "sqlite"
            path = "lethe.db"
        "#,
        )
        .unwrap();
        assert!(!config.database.is_none());
    }

    #[cfg(not(feature = "prometheus"))]
    #[test]
    fn test_disabled_metrics_feature_error() {
        let err = LetheConfig::from_str(
            r#"
            [observability.metrics]
            enabled = true
        "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("prometheus")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
