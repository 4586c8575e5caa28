//! Scheduler for daily retention runs.
//!
//! The worker fires once a day at `schedule.hour` in the configured UTC
//! offset. A run that stops on its time budget is continued after
//! `continuation_delay_secs` instead of waiting for the next day. Settings
//! are reloaded on every wake-up, so enabling, disabling or moving the
//! schedule takes effect without a restart.
//!
//! Cancellation is only observed between runs: a run in progress always
//! finishes and closes its run record before the worker returns.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use super::{error::RetentionError, eraser::RetentionEngine};
use crate::config::{RetentionSettings, SettingsSource};

/// Longest single sleep. Settings changes are noticed within this interval.
pub const RECHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// First instant strictly after `after` whose local time in `offset` is
/// `hour:00:00`.
pub fn next_occurrence(
    after: DateTime<Utc>,
    hour: u32,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let local_date = after.with_timezone(&offset).date_naive();
    let naive = local_date.and_hms_opt(hour, 0, 0)?;
    let candidate = offset.from_local_datetime(&naive).single()?.with_timezone(&Utc);

    if candidate > after {
        Some(candidate)
    } else {
        Some(candidate + Duration::days(1))
    }
}

/// When the worker should run next.
fn next_target(
    settings: &RetentionSettings,
    anchor: DateTime<Utc>,
    continue_at: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, RetentionError> {
    if let Some(at) = continue_at {
        return Ok(Some(at));
    }
    let offset = settings.schedule.offset()?;
    Ok(next_occurrence(anchor, settings.schedule.hour, offset))
}

/// Time to sleep before the next check, capped at [`RECHECK_INTERVAL`].
fn sleep_for(now: DateTime<Utc>, target: DateTime<Utc>) -> std::time::Duration {
    (target - now)
        .to_std()
        .unwrap_or_default()
        .min(RECHECK_INTERVAL)
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `false` when the worker should stop.
async fn sleep_or_shutdown(shutdown: &CancellationToken, duration: std::time::Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Starts the retention scheduler as a background task.
///
/// Runs until `shutdown` is cancelled.
pub async fn start_retention_worker(
    engine: Arc<RetentionEngine>,
    source: Arc<dyn SettingsSource>,
    shutdown: CancellationToken,
) {
    let clock = engine.clock();
    let mut anchor = clock.now();
    let mut continue_at: Option<DateTime<Utc>> = None;

    tracing::info!("Starting retention worker");

    while !shutdown.is_cancelled() {
        let settings = match source.load() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load retention settings");
                if !sleep_or_shutdown(&shutdown, RECHECK_INTERVAL).await {
                    break;
                }
                continue;
            }
        };

        let now = clock.now();

        if !settings.schedule.enabled {
            tracing::debug!("Scheduled retention disabled, re-checking later");
            anchor = now;
            continue_at = None;
            if !sleep_or_shutdown(&shutdown, RECHECK_INTERVAL).await {
                break;
            }
            continue;
        }

        let target = match next_target(&settings, anchor, continue_at) {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::error!(
                    hour = settings.schedule.hour,
                    "Retention schedule hour is not a valid time"
                );
                if !sleep_or_shutdown(&shutdown, RECHECK_INTERVAL).await {
                    break;
                }
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid retention schedule");
                if !sleep_or_shutdown(&shutdown, RECHECK_INTERVAL).await {
                    break;
                }
                continue;
            }
        };

        if now < target {
            let wait = sleep_for(now, target);
            tracing::debug!(
                next_run = %target,
                sleep_secs = wait.as_secs(),
                "Waiting for next retention run"
            );
            if !sleep_or_shutdown(&shutdown, wait).await {
                break;
            }
            continue;
        }

        continue_at = None;
        match engine.run_scheduled(&settings).await {
            Ok(summary) => {
                tracing::info!(
                    run_id = summary.run_id,
                    status = %summary.status,
                    processed = summary.processed,
                    has_more = summary.has_more,
                    "Scheduled retention run complete"
                );
                if summary.has_more {
                    continue_at = Some(
                        clock.now()
                            + Duration::seconds(settings.schedule.continuation_delay_secs as i64),
                    );
                }
            }
            Err(RetentionError::RunInProgress { run_id }) => {
                tracing::info!(run_id, "Another retention run is active, retrying later");
                continue_at = Some(
                    clock.now() + Duration::seconds(settings.schedule.continuation_delay_secs as i64),
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Error running scheduled retention");
            }
        }
        anchor = clock.now();
    }

    tracing::info!("Retention worker stopped");
}
