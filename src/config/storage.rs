//! Upload storage configuration.
//!
//! The upload root is the only directory tree the engine may delete files
//! from. Hosts that store public URLs instead of paths also set `base_url`,
//! the URL prefix under which the upload root is served.
//!
//! # Example Configuration
//!
//! ```toml
//! [storage]
//! upload_root = "/var/www/uploads"
//! base_url = "https://example.com/uploads"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Upload storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory that holds uploaded files. Nothing outside it is ever
    /// deleted.
    /// Default: "./uploads"
    #[serde(default = "default_upload_root")]
    pub upload_root: String,

    /// Public URL prefix of `upload_root`, used to map stored URLs back to
    /// paths.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_root: default_upload_root(),
            base_url: None,
        }
    }
}

fn default_upload_root() -> String {
    "./uploads".to_string()
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.upload_root.trim().is_empty() {
            return Err("storage.upload_root cannot be empty".to_string());
        }
        if let Some(base_url) = &self.base_url {
            let parsed = Url::parse(base_url)
                .map_err(|e| format!("storage.base_url is not a valid URL: {}", e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!(
                    "storage.base_url must be an http(s) URL, got scheme '{}'",
                    parsed.scheme()
                ));
            }
        }
        Ok(())
    }

    pub fn upload_root_path(&self) -> PathBuf {
        PathBuf::from(&self.upload_root)
    }
}
