//! Lethe retires stale records and the files attached to them.
//!
//! The [`retention::RetentionEngine`] works through overdue records in
//! bounded batches, applying the configured record and file dispositions and
//! recording every outcome in an audit log. Runs are triggered by the daily
//! scheduler or on demand.

pub mod config;
pub mod db;
pub mod models;
pub mod observability;
pub mod retention;
