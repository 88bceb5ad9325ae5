use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::warn;

use crate::error::BiddingError;
use crate::models::bidding::ErrorResponse;
use crate::AppState;

pub mod bidding;
pub mod bidding_admin;
pub mod bidding_scheduler;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Header carrying the caller's user id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the admin API key
pub const API_KEY_HEADER: &str = "x-api-key";

pub fn api_error(e: BiddingError) -> ApiError {
    e.into_response_parts()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Admin check against `ADMIN_API_KEY`
pub fn check_admin_auth(state: &AppState, headers: &HeaderMap) -> Result<(), BiddingError> {
    let admin_key = state
        .config
        .admin_api_key
        .as_deref()
        .ok_or_else(|| BiddingError::Config("ADMIN_API_KEY not configured".to_string()))?;

    let Some(provided) = header_value(headers, API_KEY_HEADER) else {
        warn!("Missing admin API key");
        return Err(BiddingError::AuthenticationRequired);
    };

    if provided != admin_key {
        warn!("Invalid admin API key");
        return Err(BiddingError::AuthorizationDenied("Admin access required".to_string()));
    }
    Ok(())
}

/// Caller must be signed in and manage `team_id`. Returns the user id.
pub async fn check_team_manager(
    state: &AppState,
    headers: &HeaderMap,
    team_id: &str,
) -> Result<String, BiddingError> {
    let user_id = header_value(headers, USER_ID_HEADER).ok_or(BiddingError::AuthenticationRequired)?;

    if !state.repo.is_team_manager(user_id, team_id).await? {
        warn!(user_id = %user_id, team_id = %team_id, "User is not a manager of this team");
        return Err(BiddingError::AuthorizationDenied(
            "You are not authorized to bid for this team".to_string(),
        ));
    }
    Ok(user_id.to_string())
}
