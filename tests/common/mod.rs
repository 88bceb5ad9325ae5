#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bidding_backend::config::{BiddingConfig, StoreBackend};
use bidding_backend::error::BiddingError;
use bidding_backend::models::auction::PlayerStats;
use bidding_backend::services::auction_store::{AuctionStore, MemoryAuctionStore, StoreError, VersionedValue};
use bidding_backend::services::persistence_gateway::{
    BidLedgerEntry, CommitOutcome, EligiblePlayer, FlaggedPlayer, LeagueRepository, RosterPlayer,
    SettlementCommit, TeamInfo, TeamSeasonInfo, TierInfo,
};
use bidding_backend::{build_router, AppState};

pub const ADMIN_KEY: &str = "test-admin-key";
pub const SCHEDULER_KEY: &str = "test-scheduler-key";
pub const SEASON_ID: &str = "season-1";
pub const SALARY_CAP: i64 = 30_000_000;

pub const TEAM_A: &str = "team-a";
pub const TEAM_B: &str = "team-b";
pub const MANAGER_A: &str = "user-a";
pub const MANAGER_B: &str = "user-b";

#[derive(Debug, Clone)]
pub struct FakePlayer {
    pub name: String,
    pub position: String,
    pub contract_id: String,
    pub contract_amount: i64,
    pub in_bidding: bool,
}

#[derive(Debug, Default)]
pub struct FakeLeague {
    pub tiers: Vec<TierInfo>,
    pub teams: HashMap<String, TeamInfo>,
    pub team_seasons: Vec<TeamSeasonInfo>,
    pub managers: Vec<(String, String)>,
    pub players: HashMap<String, FakePlayer>,
    /// (player season, team season)
    pub roster_links: Vec<(String, String)>,
    pub bids: Vec<BidLedgerEntry>,
}

/// In-memory relational store: one season, four tiers, two teams with a
/// team season in every tier
#[derive(Default)]
pub struct FakeLeagueRepository {
    pub league: Mutex<FakeLeague>,
    pub fail_commits: AtomicBool,
    pub commit_calls: AtomicUsize,
}

pub fn team_season_id(team_id: &str, league_id: &str) -> String {
    format!("ts-{}-{}", team_id, league_id)
}

pub fn tier_id(league_id: &str) -> String {
    format!("tier-{}", league_id)
}

impl FakeLeagueRepository {
    pub fn standard() -> Arc<Self> {
        let repo = Self::default();
        {
            let mut league = repo.league.lock();
            for (idx, league_id) in ["nhl", "ahl", "echl", "chl"].iter().enumerate() {
                league.tiers.push(TierInfo {
                    id: tier_id(league_id),
                    season_id: SEASON_ID.to_string(),
                    name: league_id.to_uppercase(),
                    league_level: idx as i32 + 1,
                    salary_cap: SALARY_CAP,
                });
                for team_id in [TEAM_A, TEAM_B] {
                    league.team_seasons.push(TeamSeasonInfo {
                        id: team_season_id(team_id, league_id),
                        team_id: team_id.to_string(),
                        tier_id: tier_id(league_id),
                    });
                }
            }
            for (team_id, name, manager) in [(TEAM_A, "Alpha", MANAGER_A), (TEAM_B, "Bravo", MANAGER_B)] {
                league.teams.insert(
                    team_id.to_string(),
                    TeamInfo {
                        id: team_id.to_string(),
                        official_name: name.to_string(),
                    },
                );
                league.managers.push((manager.to_string(), team_id.to_string()));
            }
        }
        Arc::new(repo)
    }

    pub fn add_player(&self, id: &str, position: &str, contract_amount: i64, in_bidding: bool) {
        self.league.lock().players.insert(
            id.to_string(),
            FakePlayer {
                name: format!("Player {}", id),
                position: position.to_string(),
                contract_id: format!("contract-{}", id),
                contract_amount,
                in_bidding,
            },
        );
    }

    pub fn add_roster_link(&self, player_id: &str, team_season_id: &str) {
        self.league
            .lock()
            .roster_links
            .push((player_id.to_string(), team_season_id.to_string()));
    }

    pub fn player(&self, id: &str) -> FakePlayer {
        self.league.lock().players[id].clone()
    }

    pub fn roster_links_for(&self, player_id: &str) -> Vec<String> {
        self.league
            .lock()
            .roster_links
            .iter()
            .filter(|(p, _)| p == player_id)
            .map(|(_, ts)| ts.clone())
            .collect()
    }

    pub fn ledger_len(&self) -> usize {
        self.league.lock().bids.len()
    }

    pub fn commits(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn tier_team_seasons(league: &FakeLeague, tier_id: &str) -> Vec<String> {
        league
            .team_seasons
            .iter()
            .filter(|ts| ts.tier_id == tier_id)
            .map(|ts| ts.id.clone())
            .collect()
    }

    fn rostered_in_tier(league: &FakeLeague, player_id: &str, tier_id: &str) -> bool {
        let team_seasons = Self::tier_team_seasons(league, tier_id);
        league
            .roster_links
            .iter()
            .any(|(p, ts)| p == player_id && team_seasons.contains(ts))
    }
}

#[async_trait]
impl LeagueRepository for FakeLeagueRepository {
    async fn find_tier(&self, league_id: &str) -> Result<Option<TierInfo>, BiddingError> {
        let name = league_id.to_uppercase();
        Ok(self.league.lock().tiers.iter().find(|t| t.name == name).cloned())
    }

    async fn latest_season_id(&self) -> Result<Option<String>, BiddingError> {
        Ok(Some(SEASON_ID.to_string()))
    }

    async fn find_team(&self, team_id: &str) -> Result<Option<TeamInfo>, BiddingError> {
        Ok(self.league.lock().teams.get(team_id).cloned())
    }

    async fn find_team_season(&self, team_id: &str, tier_id: &str) -> Result<Option<TeamSeasonInfo>, BiddingError> {
        Ok(self
            .league
            .lock()
            .team_seasons
            .iter()
            .find(|ts| ts.team_id == team_id && ts.tier_id == tier_id)
            .cloned())
    }

    async fn is_team_manager(&self, user_id: &str, team_id: &str) -> Result<bool, BiddingError> {
        Ok(self
            .league
            .lock()
            .managers
            .iter()
            .any(|(u, t)| u == user_id && t == team_id))
    }

    async fn roster(&self, team_season_id: &str) -> Result<Vec<RosterPlayer>, BiddingError> {
        let league = self.league.lock();
        Ok(league
            .roster_links
            .iter()
            .filter(|(_, ts)| ts == team_season_id)
            .filter_map(|(p, _)| {
                league.players.get(p).map(|player| RosterPlayer {
                    id: p.clone(),
                    name: player.name.clone(),
                    position: player.position.clone(),
                    gamertag: player.name.clone(),
                    contract_amount: player.contract_amount,
                })
            })
            .collect())
    }

    async fn eligible_players(&self, tier: &TierInfo) -> Result<Vec<EligiblePlayer>, BiddingError> {
        let league = self.league.lock();
        let mut eligible: Vec<EligiblePlayer> = league
            .players
            .iter()
            .filter(|(id, p)| p.in_bidding && !Self::rostered_in_tier(&league, id, &tier.id))
            .map(|(id, p)| EligiblePlayer {
                player_season_id: id.clone(),
                player_name: p.name.clone(),
                gamertag: None,
                position: p.position.clone(),
                contract_id: p.contract_id.clone(),
                contract_amount: p.contract_amount,
                stats: PlayerStats::default(),
            })
            .collect();
        eligible.sort_by(|a, b| a.player_season_id.cmp(&b.player_season_id));
        Ok(eligible)
    }

    async fn flagged_players(&self, _season_id: &str) -> Result<Vec<FlaggedPlayer>, BiddingError> {
        let league = self.league.lock();
        Ok(league
            .players
            .iter()
            .filter(|(_, p)| p.in_bidding)
            .map(|(id, p)| FlaggedPlayer {
                player_season_id: id.clone(),
                player_name: p.name.clone(),
                rostered_tier_ids: league
                    .roster_links
                    .iter()
                    .filter(|(l, _)| l == id)
                    .filter_map(|(_, ts)| league.team_seasons.iter().find(|t| &t.id == ts))
                    .map(|t| t.tier_id.clone())
                    .collect(),
            })
            .collect())
    }

    async fn flag_unrostered_players(&self, tier: &TierInfo) -> Result<u64, BiddingError> {
        let mut league = self.league.lock();
        let unrostered: Vec<String> = league
            .players
            .keys()
            .filter(|id| !Self::rostered_in_tier(&league, id, &tier.id))
            .cloned()
            .collect();
        for id in &unrostered {
            if let Some(player) = league.players.get_mut(id) {
                player.in_bidding = true;
            }
        }
        Ok(unrostered.len() as u64)
    }

    async fn clear_bidding_flags(&self, _season_id: &str) -> Result<u64, BiddingError> {
        let mut league = self.league.lock();
        let mut cleared = 0;
        for player in league.players.values_mut().filter(|p| p.in_bidding) {
            player.in_bidding = false;
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn clear_bidding_flag(&self, player_season_id: &str) -> Result<(), BiddingError> {
        if let Some(player) = self.league.lock().players.get_mut(player_season_id) {
            player.in_bidding = false;
        }
        Ok(())
    }

    async fn commit_settlement(&self, commit: &SettlementCommit) -> Result<CommitOutcome, BiddingError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(BiddingError::TransientStore("relational store unavailable".to_string()));
        }

        let mut league = self.league.lock();
        let outcome = match &commit.winner {
            None => CommitOutcome::NoWinner,
            Some(winner) => {
                let team_season = league
                    .team_seasons
                    .iter()
                    .find(|ts| ts.team_id == winner.team_id && ts.tier_id == commit.tier_id)
                    .map(|ts| ts.id.clone());
                match team_season {
                    None => CommitOutcome::MissingTeamSeason,
                    Some(team_season_id) => {
                        let link = (commit.player_season_id.clone(), team_season_id.clone());
                        if !league.roster_links.contains(&link) {
                            league.roster_links.push(link);
                        }
                        if let Some(player) = league.players.get_mut(&commit.player_season_id) {
                            player.contract_amount = winner.amount;
                        }
                        CommitOutcome::Assigned { team_season_id }
                    }
                }
            }
        };

        if let Some(player) = league.players.get_mut(&commit.player_season_id) {
            player.in_bidding = false;
        }
        Ok(outcome)
    }

    async fn record_bid(&self, entry: &BidLedgerEntry) -> Result<(), BiddingError> {
        self.league.lock().bids.push(entry.clone());
        Ok(())
    }

    async fn delete_bids_for_tier(&self, tier_id: &str) -> Result<u64, BiddingError> {
        let mut league = self.league.lock();
        let team_seasons = Self::tier_team_seasons(&league, tier_id);
        let before = league.bids.len();
        league.bids.retain(|b| !team_seasons.contains(&b.team_season_id));
        Ok((before - league.bids.len()) as u64)
    }
}

pub fn test_config() -> BiddingConfig {
    BiddingConfig {
        admin_api_key: Some(ADMIN_KEY.to_string()),
        scheduler_api_key: Some(SCHEDULER_KEY.to_string()),
        store_backend: StoreBackend::Memory,
        key_namespace: "test:bidding".to_string(),
        sweep_interval_secs: 0,
        ..Default::default()
    }
}

pub fn build_state(repo: Arc<FakeLeagueRepository>) -> (AppState, Arc<MemoryAuctionStore>) {
    let store = Arc::new(MemoryAuctionStore::new());
    let state = AppState::new(test_config(), store.clone(), repo);
    (state, store)
}

/// Memory store whose writes to chosen player records fail until healed
#[derive(Default)]
pub struct FlakyAuctionStore {
    pub inner: MemoryAuctionStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyAuctionStore {
    pub fn fail_player(&self, player_id: &str) {
        self.failing.lock().insert(player_id.to_string());
    }

    pub fn heal_player(&self, player_id: &str) {
        self.failing.lock().remove(player_id);
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        let failing = self.failing.lock();
        match key.rsplit_once(":player:") {
            Some((_, player_id)) if failing.contains(player_id) => {
                Err(StoreError::Backend(format!("write to {} refused", key)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl AuctionStore for FlakyAuctionStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<u64, StoreError> {
        self.check(key)?;
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: serde_json::Value,
    ) -> Result<bool, StoreError> {
        self.check(key)?;
        self.inner.compare_and_set(key, expected, value).await
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.scan(prefix).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.inner.delete(keys).await
    }
}

pub fn build_state_with_store(repo: Arc<FakeLeagueRepository>, store: Arc<dyn AuctionStore>) -> AppState {
    AppState::new(test_config(), store, repo)
}

pub fn build_app(repo: Arc<FakeLeagueRepository>) -> (Router, AppState) {
    let (state, _) = build_state(repo);
    (build_router(state.clone()), state)
}

pub fn json_request(method: &str, uri: &str, headers: &[(&str, &str)], body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
