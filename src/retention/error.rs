use thiserror::Error;

use crate::{config::ConfigError, db::DbError};

/// Failure to start (or, for the estimator, to read) an invocation.
///
/// Failures inside a running batch never surface here; they are written to
/// the audit log and folded into the run status.
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Retention run {run_id} is still in progress")]
    RunInProgress { run_id: i64 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type RetentionResult<T> = Result<T, RetentionError>;
