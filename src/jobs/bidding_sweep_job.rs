//! Bidding Sweep Job
//!
//! In-process timer for the league scheduler, alongside the external
//! `/bidding/scheduler` trigger. Both go through the scheduler's sweep guard,
//! so a tick that lands during an HTTP-triggered sweep is skipped.
//! Supports graceful shutdown via SIGTERM/SIGINT signals.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{info, warn};

use crate::services::league_scheduler::LeagueScheduler;

/// Start the bidding sweep job
///
/// Spawns a background task that runs one sweep every `interval_secs`.
/// An interval of 0 disables the task (external cron only).
pub async fn start_bidding_sweep_job(scheduler: Arc<LeagueScheduler>, interval_secs: u64) {
    if interval_secs == 0 {
        info!("Bidding sweep job disabled, relying on external scheduler trigger");
        return;
    }

    tokio::spawn(async move {
        info!(interval_secs = interval_secs, "Bidding sweep job started");

        let mut interval = interval(TokioDuration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping bidding sweep job");
                    break;
                }
                _ = interval.tick() => {
                    let report = scheduler.trigger(Utc::now()).await;
                    if report.skipped {
                        continue;
                    }
                    if !report.errors.is_empty() {
                        // Next tick retries whatever failed
                        warn!(sweep_id = %report.sweep_id, errors = ?report.errors, "Bidding sweep finished with errors");
                    }
                }
            }
        }

        info!("Bidding sweep job stopped");
    });
}
