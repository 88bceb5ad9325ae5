//! /bidding handlers: auction board, bid placement and admin window control

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{BiddingError, ValidationError};
use crate::handlers::{api_error, check_admin_auth, check_team_manager, ApiError};
use crate::models::bidding::{
    BiddingBoardResponse, BiddingQuery, ManageBiddingRequest, ManageBiddingResponse, PlaceBidRequest,
    PlaceBidResponse, TeamBiddingData,
};
use crate::services::auction_engine::Bidder;
use crate::services::roster_budget::{current_salary, BudgetCheck};
use crate::AppState;

/// GET /bidding?leagueId=nhl&teamId=...
///
/// Active auctions of the league's tier. With `teamId` the caller must
/// manage that team and the response includes its committed bids and cap
/// situation.
///
/// # Response
///
/// ```json
/// {
///   "biddingPlayers": [{ "playerId": "ps-1", "currentBid": 750000, "status": "active", ... }],
///   "biddingStatus": { "leagueId": "nhl", "active": true, "startTime": 0, "endTime": 0, "tierLevel": 1, ... },
///   "teamData": { "activeBids": [], "totalCommitted": 0, "roster": [], "salaryCap": 30000000, "currentSalary": 0 },
///   "tierId": "tier-nhl"
/// }
/// ```
pub async fn get_bidding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BiddingQuery>,
) -> Result<Json<BiddingBoardResponse>, ApiError> {
    let league_id = query
        .league_id
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| api_error(BiddingError::BadRequest("League ID is required".to_string())))?;

    let tier = state
        .repo
        .find_tier(league_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(BiddingError::NotFound("Tier not found".to_string())))?;

    let bidding_players = state
        .engine
        .records()
        .players_in_tier(&tier.id)
        .await
        .map_err(api_error)?
        .into_iter()
        .filter(|r| r.is_active())
        .collect();

    let team_data = match query.team_id.as_deref().filter(|t| !t.is_empty()) {
        Some(team_id) => {
            check_team_manager(&state, &headers, team_id).await.map_err(api_error)?;

            let committed = state.engine.committed_bids(team_id).await.map_err(api_error)?;
            let roster = match state
                .repo
                .find_team_season(team_id, &tier.id)
                .await
                .map_err(api_error)?
            {
                Some(team_season) => state.repo.roster(&team_season.id).await.map_err(api_error)?,
                None => Vec::new(),
            };

            Some(TeamBiddingData {
                active_bids: committed.active_bids,
                total_committed: committed.total_committed,
                current_salary: current_salary(&roster),
                roster,
                salary_cap: tier.salary_cap,
            })
        }
        None => None,
    };

    let bidding_status = state
        .engine
        .records()
        .load_window(league_id)
        .await
        .map_err(api_error)?
        .map(|v| v.record);

    Ok(Json(BiddingBoardResponse {
        bidding_players,
        bidding_status,
        team_data,
        tier_id: tier.id,
    }))
}

/// POST /bidding
///
/// Place a bid for a team the caller manages.
///
/// # Request Body
///
/// ```json
/// { "playerSeasonId": "ps-1", "teamId": "team-1", "amount": 750000, "leagueId": "nhl" }
/// ```
///
/// Returns 400 for rejected bids (with the reason), 403 when the caller does
/// not manage the team and 404 for unknown teams, tiers or players.
pub async fn place_bid(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PlaceBidRequest>, JsonRejection>,
) -> Result<Json<PlaceBidResponse>, ApiError> {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let Json(request) = payload.map_err(|e| {
        warn!(correlation_id = %correlation_id, error = %e, "Malformed bid request");
        api_error(BiddingError::BadRequest("Missing required fields".to_string()))
    })?;

    info!(
        correlation_id = %correlation_id,
        player_id = %request.player_season_id,
        team_id = %request.team_id,
        amount = request.amount,
        league_id = %request.league_id,
        "Bid request received"
    );

    let span = info_span!("place_bid", correlation_id = %correlation_id);
    match submit_bid(&state, &headers, &request).instrument(span).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!(correlation_id = %correlation_id, error = %e, "Bid rejected");
            Err(api_error(e))
        }
    }
}

async fn submit_bid(
    state: &AppState,
    headers: &HeaderMap,
    request: &PlaceBidRequest,
) -> Result<PlaceBidResponse, BiddingError> {
    if request.player_season_id.trim().is_empty()
        || request.team_id.trim().is_empty()
        || request.league_id.trim().is_empty()
    {
        return Err(BiddingError::BadRequest("Missing required fields".to_string()));
    }

    check_team_manager(state, headers, &request.team_id).await?;

    let now = Utc::now();
    let league_id = request.league_id.to_lowercase();
    let window_open = state
        .engine
        .records()
        .load_window(&league_id)
        .await?
        .is_some_and(|w| w.record.is_open(now.timestamp_millis()));
    if !window_open {
        return Err(BiddingError::NotActive(league_id));
    }

    let team = state
        .repo
        .find_team(&request.team_id)
        .await?
        .ok_or_else(|| BiddingError::NotFound("Team not found".to_string()))?;
    let tier = state
        .repo
        .find_tier(&league_id)
        .await?
        .ok_or_else(|| BiddingError::NotFound("Tier not found".to_string()))?;
    let team_season = state
        .repo
        .find_team_season(&team.id, &tier.id)
        .await?
        .ok_or_else(|| BiddingError::BadRequest("Team not registered for this season".to_string()))?;

    let record = state
        .engine
        .records()
        .load_player(&request.player_season_id)
        .await?
        .ok_or_else(|| BiddingError::NotFound("Player not found in bidding".to_string()))?
        .record;
    if record.tier_id != tier.id {
        return Err(ValidationError::TierMismatch {
            record_tier: record.tier_name.clone(),
            requested_tier: tier.name.clone(),
        }
        .into());
    }

    let roster = state.repo.roster(&team_season.id).await?;
    let committed = state.engine.committed_bids(&team.id).await?;
    BudgetCheck {
        salary_cap: tier.salary_cap,
        roster: &roster,
        committed: &committed,
        player_id: &record.player_id,
        position: &record.position,
        amount: request.amount,
    }
    .check()?;

    let bidder = Bidder {
        team_id: team.id.clone(),
        team_name: team.official_name.clone(),
    };
    let outcome = state
        .engine
        .place_bid(&request.player_season_id, &bidder, request.amount, now)
        .await?;

    state
        .engine
        .gateway()
        .record_bid(&outcome.record, &team_season.id, request.amount)
        .await;

    Ok(PlaceBidResponse {
        success: true,
        bidding: outcome.record,
    })
}

/// PATCH /bidding (admin)
///
/// ```json
/// { "action": "start" | "stop" | "finalize", "leagueId": "nhl" }
/// ```
pub async fn manage_bidding(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ManageBiddingRequest>, JsonRejection>,
) -> Result<Json<ManageBiddingResponse>, ApiError> {
    check_admin_auth(&state, &headers).map_err(api_error)?;

    let Json(request) = payload.map_err(|e| {
        warn!(error = %e, "Malformed bidding management request");
        api_error(BiddingError::BadRequest("Invalid action or missing required fields".to_string()))
    })?;

    info!(action = ?request.action, league_id = %request.league_id, "Admin bidding action");

    state
        .admin
        .manage(request.action, &request.league_id, Utc::now())
        .await
        .map(Json)
        .map_err(api_error)
}
