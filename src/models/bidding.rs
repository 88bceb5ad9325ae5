//! Request/response models for the /bidding endpoints

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::auction::{LeagueAuctionWindow, PlayerAuctionRecord};
use crate::services::persistence_gateway::RosterPlayer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /bidding query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiddingQuery {
    pub league_id: Option<String>,
    pub team_id: Option<String>,
}

/// POST /bidding body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub player_season_id: String,
    pub team_id: String,
    pub amount: i64,
    pub league_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiddingAction {
    Start,
    Stop,
    Finalize,
}

/// PATCH /bidding body (admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageBiddingRequest {
    pub action: BiddingAction,
    pub league_id: String,
}

/// GET /bidding/scheduler query
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerQuery {
    pub key: Option<String>,
}

/// POST /bidding/reset body (admin)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[serde(default = "default_reset_league")]
    pub league_id: String,
    #[serde(default = "default_true")]
    pub reset_database: bool,
    #[serde(default)]
    pub reinitialize: bool,
    /// Drop completed auctions whose relational commit still fails after replay
    #[serde(default)]
    pub drop_unsettled: bool,
}

fn default_reset_league() -> String {
    "nhl".to_string()
}

fn default_true() -> bool {
    true
}

/// A live auction the team currently leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedBid {
    pub player_season_id: String,
    pub player_name: String,
    pub position: String,
    pub amount: i64,
    pub deadline: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedBids {
    pub total_committed: i64,
    pub active_bids: Vec<CommittedBid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamBiddingData {
    pub active_bids: Vec<CommittedBid>,
    pub total_committed: i64,
    pub roster: Vec<RosterPlayer>,
    pub salary_cap: i64,
    pub current_salary: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiddingBoardResponse {
    pub bidding_players: Vec<PlayerAuctionRecord>,
    pub bidding_status: Option<LeagueAuctionWindow>,
    pub team_data: Option<TeamBiddingData>,
    pub tier_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidResponse {
    pub success: bool,
    pub bidding: PlayerAuctionRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageBiddingResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_players: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResults {
    pub bidding_keys_deleted: u64,
    pub status_keys_deleted: u64,
    pub bids_deleted: u64,
    pub player_bidding_flags_reset: u64,
    pub players_initialized: usize,
    /// Pending settlements committed by the replay before the wipe
    pub settlements_confirmed: usize,
    /// Completed auctions dropped before their relational commit was confirmed
    pub unsettled_dropped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
    pub results: ResetResults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatusResponse {
    /// League id -> window; leagues never opened are absent
    pub bidding_status: BTreeMap<String, LeagueAuctionWindow>,
    pub active_bidding: Option<LeagueAuctionWindow>,
}
