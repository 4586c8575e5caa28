//! Physical removal of uploaded files.
//!
//! Every deletion is jailed to the upload root: symlinks are never followed
//! or removed, and a path whose canonical form is not strictly below the
//! canonical upload root is rejected. A missing file is not an error.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    config::{ConfigError, StorageConfig},
    db::RecordStore,
    models::{FileReference, Record, normalize_field_value},
};

#[derive(Debug, Error)]
pub enum FileDeleteError {
    #[error("Upload root {0} is unavailable: {1}")]
    UploadRoot(PathBuf, #[source] io::Error),

    #[error("Refusing to delete symbolic link {0}")]
    Symlink(PathBuf),

    #[error("Path {0} is outside the upload root")]
    OutsideRoot(PathBuf),

    #[error("Path {0} is not a regular file")]
    NotAFile(PathBuf),

    #[error("Path {0} is not writable")]
    NotWritable(PathBuf),

    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
}

/// Result of deleting one file reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub deleted: bool,
    pub error: bool,
}

impl FileOutcome {
    const DELETED: Self = Self {
        deleted: true,
        error: false,
    };
    const NOOP: Self = Self {
        deleted: false,
        error: false,
    };
    const ERROR: Self = Self {
        deleted: false,
        error: true,
    };
}

/// Totals over every file of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCleanup {
    pub deleted: u32,
    pub errors: u32,
}

impl FileCleanup {
    pub fn add(&mut self, outcome: FileOutcome) {
        if outcome.deleted {
            self.deleted += 1;
        }
        if outcome.error {
            self.errors += 1;
        }
    }
}

/// Deletes uploaded files inside a single upload root.
#[derive(Debug, Clone)]
pub struct FileDeleter {
    upload_root: PathBuf,
    base_url: Option<Url>,
}

impl FileDeleter {
    pub fn new(upload_root: impl Into<PathBuf>, base_url: Option<Url>) -> Self {
        Self {
            upload_root: upload_root.into(),
            base_url,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| ConfigError::Validation(format!("storage.base_url: {}", e)))?;
        Ok(Self::new(config.upload_root_path(), base_url))
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    /// Delete every file referenced by a record's file-bearing fields.
    ///
    /// A field that cannot be read counts as one file error.
    pub async fn cleanup_files(
        &self,
        store: &dyn RecordStore,
        record: &Record,
        file_fields: &[String],
    ) -> FileCleanup {
        let mut totals = FileCleanup::default();

        for field_key in file_fields {
            let value = match store.get_field_value(record.id, field_key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        record_id = record.id,
                        field_key = %field_key,
                        error = %e,
                        "Failed to read file field"
                    );
                    totals.errors += 1;
                    continue;
                }
            };

            for reference in normalize_field_value(&value) {
                totals.add(self.delete_file(&reference).await);
            }
        }

        totals
    }

    /// Delete a single file reference, classifying any failure.
    #[instrument(skip_all, fields(reference = %reference))]
    pub async fn delete_file(&self, reference: &FileReference) -> FileOutcome {
        match self.try_delete(reference).await {
            Ok(true) => FileOutcome::DELETED,
            Ok(false) => FileOutcome::NOOP,
            Err(e) => {
                warn!(error = %e, "File deletion refused");
                FileOutcome::ERROR
            }
        }
    }

    async fn try_delete(&self, reference: &FileReference) -> Result<bool, FileDeleteError> {
        let Some(candidate) = self.resolve_candidate(reference).await else {
            debug!("Nothing to delete");
            return Ok(false);
        };

        let metadata = match tokio::fs::symlink_metadata(&candidate).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(FileDeleteError::Io(candidate, e)),
        };

        if metadata.file_type().is_symlink() {
            return Err(FileDeleteError::Symlink(candidate));
        }

        let root = tokio::fs::canonicalize(&self.upload_root)
            .await
            .map_err(|e| FileDeleteError::UploadRoot(self.upload_root.clone(), e))?;
        let canonical = match tokio::fs::canonicalize(&candidate).await {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(FileDeleteError::Io(candidate, e)),
        };

        if canonical == root || !canonical.starts_with(&root) {
            return Err(FileDeleteError::OutsideRoot(canonical));
        }
        if !metadata.is_file() {
            return Err(FileDeleteError::NotAFile(canonical));
        }
        if metadata.permissions().readonly() {
            return Err(FileDeleteError::NotWritable(canonical));
        }

        match tokio::fs::remove_file(&canonical).await {
            Ok(()) => {
                info!(path = %canonical.display(), "File deleted");
                Ok(true)
            }
            // Removed concurrently
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(FileDeleteError::NotWritable(canonical))
            }
            Err(e) => Err(FileDeleteError::Io(canonical, e)),
        }
    }

    /// The raw value if something exists there, else the path a URL maps to.
    async fn resolve_candidate(&self, reference: &FileReference) -> Option<PathBuf> {
        let raw = reference.as_str().trim();
        if raw.is_empty() {
            return None;
        }

        let as_path = PathBuf::from(raw);
        if tokio::fs::symlink_metadata(&as_path).await.is_ok() {
            return Some(as_path);
        }

        let url = Url::parse(raw).ok()?;
        self.map_url(&url)
    }

    /// Map an uploaded file's public URL to its path under the upload root.
    ///
    /// The query string and fragment are ignored. URLs not served from
    /// `base_url` (or any URL, when no `base_url` is configured) do not map.
    fn map_url(&self, url: &Url) -> Option<PathBuf> {
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let base = self.base_url.as_ref()?;
        if url.scheme() != base.scheme()
            || url.host_str() != base.host_str()
            || url.port_or_known_default() != base.port_or_known_default()
        {
            return None;
        }

        let base_path = base.path().trim_end_matches('/');
        let relative = url.path().strip_prefix(base_path)?.strip_prefix('/')?;
        if relative.is_empty() {
            return None;
        }

        // Percent-decoding goes through a file URL rooted at the upload root
        let root = std::path::absolute(&self.upload_root).ok()?;
        let root_url = Url::from_directory_path(&root).ok()?;
        root_url
            .join(&format!("./{}", relative))
            .ok()?
            .to_file_path()
            .ok()
    }
}
