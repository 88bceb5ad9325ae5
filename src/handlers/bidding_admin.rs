//! Admin-only bidding maintenance: reset, window status, drift report

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::error::BiddingError;
use crate::handlers::{api_error, check_admin_auth, ApiError};
use crate::models::bidding::{AdminStatusResponse, ResetRequest, ResetResponse};
use crate::services::reconciliation::DiscrepancyReport;
use crate::AppState;

/// POST /bidding/reset
///
/// # Request Body (all fields optional)
///
/// ```json
/// { "leagueId": "nhl", "resetDatabase": true, "reinitialize": false, "dropUnsettled": false }
/// ```
///
/// Responds 409 when completed auctions still cannot be committed and
/// `dropUnsettled` is not set.
pub async fn reset_bidding(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<Json<ResetResponse>, ApiError> {
    check_admin_auth(&state, &headers).map_err(api_error)?;

    let Json(request) = payload.map_err(|e| {
        warn!(error = %e, "Malformed reset request");
        api_error(BiddingError::BadRequest(format!("Invalid reset request: {}", e.body_text())))
    })?;

    info!(
        league_id = %request.league_id,
        reset_database = request.reset_database,
        reinitialize = request.reinitialize,
        "Bidding reset requested"
    );

    state
        .admin
        .reset(&request, Utc::now())
        .await
        .map(Json)
        .map_err(api_error)
}

/// GET /bidding/admin/status
pub async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminStatusResponse>, ApiError> {
    check_admin_auth(&state, &headers).map_err(api_error)?;
    state.admin.status().await.map(Json).map_err(api_error)
}

/// GET /bidding/admin/discrepancies
pub async fn get_discrepancies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DiscrepancyReport>, ApiError> {
    check_admin_auth(&state, &headers).map_err(api_error)?;
    state
        .reconciliation
        .discrepancies(Utc::now())
        .await
        .map(Json)
        .map_err(api_error)
}
