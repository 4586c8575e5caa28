//! Prometheus metrics for retention runs.
//!
//! Counters are recorded unconditionally; they are only exported when the
//! crate is built with `prometheus` and `observability.metrics.enabled` is
//! set, in which case `lethe serve` exposes a scrape endpoint.

#[cfg(feature = "prometheus")]
use metrics::counter;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let listen: std::net::SocketAddr = config
        .listen
        .parse()
        .map_err(|e| MetricsError::Setup(format!("invalid listen address: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;

    tracing::info!(%listen, "Prometheus metrics endpoint listening");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!("Metrics are enabled but lethe was built without the 'prometheus' feature");
    }
    Ok(())
}

/// Record one processed record, labelled by its log status.
pub fn record_retention_record(status: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_records_total", "status" => status.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = status;
    }
}

/// Record the file cleanup of one record.
pub fn record_retention_files(deleted: u32, errors: u32) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_files_deleted_total").increment(u64::from(deleted));
        counter!("retention_file_errors_total").increment(u64::from(errors));
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (deleted, errors);
    }
}

/// Record a finished run.
pub fn record_retention_run(status: &str, processed: u32) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_runs_total", "status" => status.to_string()).increment(1);
        counter!("retention_run_processed_total").increment(u64::from(processed));
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (status, processed);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        record_retention_record("success");
        record_retention_files(2, 1);
        record_retention_run("warning", 3);
    }

    #[test]
    fn test_disabled_metrics_do_not_install() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }
}
