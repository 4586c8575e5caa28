//! Observability: structured logging and retention metrics.
//!
//! Logging goes through `tracing`; the subscriber is only installed by the
//! binary (`server` feature). Metrics are `metrics` counters exported over
//! HTTP when built with `prometheus`.

pub mod metrics;
#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;
