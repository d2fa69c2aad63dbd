//! Background sampling: runs one cycle per tick until shutdown.

use std::sync::PoisonError;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use airflow_exporter_core::collector::FileSystem;

use crate::state::SharedCycle;

pub(crate) async fn tick_loop<F: FileSystem + 'static>(
    cycle: SharedCycle<F>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut cycle_count: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(cycle_count, "sampling loop stopped");
                return;
            }
            _ = tick.tick() => {}
        }

        // Reading /proc is blocking: run it off the async runtime
        let cycle_clone = cycle.clone();
        let result = tokio::task::spawn_blocking(move || {
            cycle_clone
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .run_once()
        })
        .await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "sampling cycle panicked in spawn_blocking");
                continue;
            }
        };

        cycle_count += 1;
        let duration_ms = report.duration.as_millis() as u64;
        if cycle_count == 1 {
            info!(
                duration_ms,
                published = report.published,
                scanned = report.scanned,
                "first cycle published"
            );
        } else {
            debug!(
                duration_ms,
                published = report.published,
                unparsed = report.unparsed,
                scanned = report.scanned,
                unreadable = report.unreadable,
                enumerated = report.enumerated,
                cycle_count,
                "cycle completed"
            );
        }

        if report.unparsed > 0 {
            warn!(
                unparsed = report.unparsed,
                "task runners with unrecognised command line published with blank identity"
            );
        }

        if report.duration > interval / 2 {
            warn!(
                duration_ms,
                interval_ms = interval.as_millis() as u64,
                "cycle exceeded 50% of interval"
            );
        }
    }
}
