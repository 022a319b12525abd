//! Daily scheduled sweep

use cadence_core::{MaintenanceSweep, SweepError, SweepTrigger};
use cadence_util::WallClock;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Next local instant strictly after `now` whose wall-clock time is `at`.
///
/// A local time skipped by a DST jump resolves to the following day.
pub fn next_run_after(now: DateTime<Local>, at: WallClock) -> DateTime<Local> {
    let mut date = now.date_naive();
    loop {
        let candidate: NaiveDateTime = date.and_time(at.to_naive_time());
        if let Some(local) = Local.from_local_datetime(&candidate).earliest() {
            if local > now {
                return local;
            }
        }
        let Some(next) = date.succ_opt() else {
            return now;
        };
        date = next;
    }
}

/// Run a sweep every day at `at` until `cancel` fires.
pub async fn run(sweep: Arc<MaintenanceSweep>, at: WallClock, cancel: CancellationToken) {
    info!(sweep_at = %at, "Sweep scheduler started");

    loop {
        let now = cadence_util::now();
        let next = next_run_after(now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "Next scheduled sweep");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Sweep scheduler stopping");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                match sweep.run(cadence_util::now(), SweepTrigger::Scheduled).await {
                    Ok(report) => info!(
                        overdue_marked = report.overdue_marked,
                        materialized = report.materialized,
                        pruned = report.pruned,
                        "Scheduled sweep finished"
                    ),
                    Err(SweepError::AlreadyRunning) => {
                        warn!("Scheduled sweep skipped, another sweep is running");
                    }
                    Err(e) => error!(error = %e, "Scheduled sweep failed"),
                }
            }
        }
    }
}
