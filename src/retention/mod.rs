//! Retention engine.
//!
//! Retires records older than their category's retention window, together
//! with the files they reference, and keeps an audit trail of every run:
//!
//! - [`rules`] resolves the retention window of a category
//! - [`files`] deletes files, jailed to the upload root
//! - [`run_log`] records runs and per-record log entries
//! - [`estimate`] counts what a run would touch, read-only
//! - [`eraser`] runs time-boxed, multi-pass batches
//! - [`worker`] fires scheduled runs
//!
//! Every invocation is bounded by a wall-clock budget; a run that stops on
//! its budget reports `has_more` and is resumed by the caller.

pub mod clock;
pub mod eraser;
mod error;
pub mod estimate;
pub mod files;
pub mod rules;
pub mod run_log;
mod worker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use eraser::{EngineLimits, RetentionEngine, RunSummary, Trigger};
pub use error::{RetentionError, RetentionResult};
pub use estimate::{Estimate, EstimateScope};
pub use files::{FileCleanup, FileDeleter, FileOutcome};
pub use rules::{RetentionWindow, resolve_days};
pub use worker::{next_occurrence, start_retention_worker};
