//! GET /bidding/scheduler?key=<secret>
//!
//! External cron entry point. Runs one sweep (or reports that one is already
//! running) and returns its report.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use tracing::{error, warn};

use crate::error::BiddingError;
use crate::handlers::{api_error, ApiError};
use crate::models::bidding::SchedulerQuery;
use crate::services::league_scheduler::SweepReport;
use crate::AppState;

fn check_scheduler_key(state: &AppState, provided: Option<&str>) -> Result<(), BiddingError> {
    let Some(expected) = state.config.scheduler_api_key.as_deref() else {
        error!("SCHEDULER_API_KEY not configured");
        return Err(BiddingError::Config("SCHEDULER_API_KEY not configured".to_string()));
    };

    if provided != Some(expected) {
        warn!("Scheduler triggered with invalid key");
        return Err(BiddingError::AuthenticationRequired);
    }
    Ok(())
}

pub async fn run_scheduler(
    State(state): State<AppState>,
    Query(query): Query<SchedulerQuery>,
) -> Result<Json<SweepReport>, ApiError> {
    check_scheduler_key(&state, query.key.as_deref()).map_err(api_error)?;

    Ok(Json(state.scheduler.trigger(Utc::now()).await))
}
