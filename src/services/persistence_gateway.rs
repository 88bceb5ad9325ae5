//! Persistence Gateway
//!
//! Write path from the auction engine into the relational league store:
//! commits a finished auction (roster link + contract amount), clears the
//! player's "in bidding" flag and appends to the bid ledger.
//!
//! `LeagueRepository` is the seam to the relational store. The SeaORM
//! implementation lives here; tests substitute an in-memory one.

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::entities::{
    bids, contracts, player_seasons, player_team_seasons, players, prelude::*, seasons,
    team_managers, team_seasons, tiers,
};
use crate::error::BiddingError;
use crate::models::auction::{PlayerAuctionRecord, PlayerStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierInfo {
    pub id: String,
    pub season_id: String,
    pub name: String,
    pub league_level: i32,
    pub salary_cap: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamInfo {
    pub id: String,
    pub official_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSeasonInfo {
    pub id: String,
    pub team_id: String,
    pub tier_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPlayer {
    /// player-season id
    pub id: String,
    pub name: String,
    pub position: String,
    pub gamertag: String,
    pub contract_amount: i64,
}

/// Player flagged for bidding and not rostered in the tier being opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligiblePlayer {
    pub player_season_id: String,
    pub player_name: String,
    pub gamertag: Option<String>,
    pub position: String,
    pub contract_id: String,
    pub contract_amount: i64,
    pub stats: PlayerStats,
}

/// Player whose "in bidding" flag is set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedPlayer {
    pub player_season_id: String,
    pub player_name: String,
    /// Tiers where the player already has a roster assignment
    pub rostered_tier_ids: Vec<String>,
}

impl FlaggedPlayer {
    pub fn is_rostered_in(&self, tier_id: &str) -> bool {
        self.rostered_tier_ids.iter().any(|t| t == tier_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinningBid {
    pub team_id: String,
    pub amount: i64,
}

/// Everything the relational store needs to settle one auction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementCommit {
    pub player_season_id: String,
    pub contract_id: String,
    pub tier_id: String,
    pub winner: Option<WinningBid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Assigned { team_season_id: String },
    /// Nobody bid; only the eligibility flag was cleared
    NoWinner,
    /// Winner has no team season in the tier; flag cleared, player unassigned
    MissingTeamSeason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidLedgerEntry {
    pub contract_id: String,
    pub team_season_id: String,
    pub amount: i64,
}

#[async_trait]
pub trait LeagueRepository: Send + Sync {
    /// Tier named after the league in the latest season
    async fn find_tier(&self, league_id: &str) -> Result<Option<TierInfo>, BiddingError>;

    async fn latest_season_id(&self) -> Result<Option<String>, BiddingError>;

    async fn find_team(&self, team_id: &str) -> Result<Option<TeamInfo>, BiddingError>;

    async fn find_team_season(
        &self,
        team_id: &str,
        tier_id: &str,
    ) -> Result<Option<TeamSeasonInfo>, BiddingError>;

    async fn is_team_manager(&self, user_id: &str, team_id: &str) -> Result<bool, BiddingError>;

    async fn roster(&self, team_season_id: &str) -> Result<Vec<RosterPlayer>, BiddingError>;

    async fn eligible_players(&self, tier: &TierInfo) -> Result<Vec<EligiblePlayer>, BiddingError>;

    async fn flagged_players(&self, season_id: &str) -> Result<Vec<FlaggedPlayer>, BiddingError>;

    /// Flag every player of the tier's season not rostered in that tier
    async fn flag_unrostered_players(&self, tier: &TierInfo) -> Result<u64, BiddingError>;

    async fn clear_bidding_flags(&self, season_id: &str) -> Result<u64, BiddingError>;

    async fn clear_bidding_flag(&self, player_season_id: &str) -> Result<(), BiddingError>;

    /// Apply a settlement atomically. Must be idempotent: replays after a
    /// partial failure may call it again for the same player.
    async fn commit_settlement(&self, commit: &SettlementCommit) -> Result<CommitOutcome, BiddingError>;

    async fn record_bid(&self, entry: &BidLedgerEntry) -> Result<(), BiddingError>;

    async fn delete_bids_for_tier(&self, tier_id: &str) -> Result<u64, BiddingError>;
}

/// Drains finished auctions into the relational store
#[derive(Clone)]
pub struct PersistenceGateway {
    repo: Arc<dyn LeagueRepository>,
}

impl PersistenceGateway {
    pub fn new(repo: Arc<dyn LeagueRepository>) -> Self {
        Self { repo }
    }

    /// Commit a completed auction: winner to roster at the winning amount,
    /// then clear the eligibility flag in every case.
    pub async fn commit(&self, record: &PlayerAuctionRecord) -> Result<CommitOutcome, BiddingError> {
        let winner = match &record.settlement {
            Some(s) => s
                .winning_team_id
                .clone()
                .zip(s.winning_amount)
                .map(|(team_id, amount)| WinningBid { team_id, amount }),
            None => record
                .current_team_id
                .clone()
                .zip(record.current_bid)
                .map(|(team_id, amount)| WinningBid { team_id, amount }),
        };

        let commit = SettlementCommit {
            player_season_id: record.player_id.clone(),
            contract_id: record.contract_id.clone(),
            tier_id: record.tier_id.clone(),
            winner,
        };

        let outcome = self.repo.commit_settlement(&commit).await?;
        match &outcome {
            CommitOutcome::Assigned { team_season_id } => info!(
                player_id = %record.player_id,
                player_name = %record.player_name,
                team_season_id = %team_season_id,
                amount = ?record.current_bid,
                "Assigned auction winner to roster"
            ),
            CommitOutcome::NoWinner => info!(
                player_id = %record.player_id,
                player_name = %record.player_name,
                "Auction closed without bids"
            ),
            CommitOutcome::MissingTeamSeason => error!(
                player_id = %record.player_id,
                team_id = ?record.current_team_id,
                tier_id = %record.tier_id,
                "Winning team has no team season in tier; player left unassigned"
            ),
        }
        Ok(outcome)
    }

    /// Audit-trail write for an accepted bid. Failures are logged only.
    pub async fn record_bid(&self, record: &PlayerAuctionRecord, team_season_id: &str, amount: i64) {
        let entry = BidLedgerEntry {
            contract_id: record.contract_id.clone(),
            team_season_id: team_season_id.to_string(),
            amount,
        };
        if let Err(e) = self.repo.record_bid(&entry).await {
            warn!(
                player_id = %record.player_id,
                amount = amount,
                error = %e,
                "Failed to append bid to ledger"
            );
        }
    }
}

/// SeaORM implementation over the league schema
#[derive(Clone)]
pub struct SeaOrmLeagueRepository {
    db: DatabaseConnection,
    tier_cache: Arc<Cache<String, TierInfo>>,
}

impl SeaOrmLeagueRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        let tier_cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(Duration::from_secs(300)) // 5 min TTL
            .build();

        Self {
            db,
            tier_cache: Arc::new(tier_cache),
        }
    }

    async fn rostered_in_tier(&self, tier_id: &str) -> Result<HashSet<String>, BiddingError> {
        let team_season_ids: Vec<String> = TeamSeasons::find()
            .filter(team_seasons::Column::TierId.eq(tier_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|ts| ts.id)
            .collect();

        if team_season_ids.is_empty() {
            return Ok(HashSet::new());
        }

        Ok(PlayerTeamSeasons::find()
            .filter(player_team_seasons::Column::TeamSeasonId.is_in(team_season_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|link| link.player_season_id)
            .collect())
    }

    async fn players_by_id(&self, ids: Vec<String>) -> Result<HashMap<String, players::Model>, BiddingError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(Players::find()
            .filter(players::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect())
    }

    async fn contracts_by_id(&self, ids: Vec<String>) -> Result<HashMap<String, contracts::Model>, BiddingError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(Contracts::find()
            .filter(contracts::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect())
    }
}

#[async_trait]
impl LeagueRepository for SeaOrmLeagueRepository {
    async fn find_tier(&self, league_id: &str) -> Result<Option<TierInfo>, BiddingError> {
        let cache_key = league_id.to_lowercase();
        if let Some(tier) = self.tier_cache.get(&cache_key).await {
            return Ok(Some(tier));
        }

        let Some(season_id) = self.latest_season_id().await? else {
            return Ok(None);
        };

        let tier = Tiers::find()
            .filter(tiers::Column::SeasonId.eq(season_id))
            .filter(tiers::Column::Name.eq(league_id.to_uppercase()))
            .one(&self.db)
            .await?
            .map(|t| TierInfo {
                id: t.id,
                season_id: t.season_id,
                name: t.name,
                league_level: t.league_level,
                salary_cap: t.salary_cap,
            });

        if let Some(tier) = &tier {
            self.tier_cache.insert(cache_key, tier.clone()).await;
        }
        Ok(tier)
    }

    async fn latest_season_id(&self) -> Result<Option<String>, BiddingError> {
        Ok(Seasons::find()
            .filter(seasons::Column::IsLatest.eq(true))
            .one(&self.db)
            .await?
            .map(|s| s.id))
    }

    async fn find_team(&self, team_id: &str) -> Result<Option<TeamInfo>, BiddingError> {
        Ok(Teams::find_by_id(team_id.to_string())
            .one(&self.db)
            .await?
            .map(|t| TeamInfo {
                id: t.id,
                official_name: t.official_name,
            }))
    }

    async fn find_team_season(
        &self,
        team_id: &str,
        tier_id: &str,
    ) -> Result<Option<TeamSeasonInfo>, BiddingError> {
        Ok(TeamSeasons::find()
            .filter(team_seasons::Column::TeamId.eq(team_id))
            .filter(team_seasons::Column::TierId.eq(tier_id))
            .one(&self.db)
            .await?
            .map(|ts| TeamSeasonInfo {
                id: ts.id,
                team_id: ts.team_id,
                tier_id: ts.tier_id,
            }))
    }

    async fn is_team_manager(&self, user_id: &str, team_id: &str) -> Result<bool, BiddingError> {
        let manager = TeamManagers::find()
            .filter(team_managers::Column::UserId.eq(user_id))
            .filter(team_managers::Column::TeamId.eq(team_id))
            .one(&self.db)
            .await?;
        Ok(manager.is_some())
    }

    async fn roster(&self, team_season_id: &str) -> Result<Vec<RosterPlayer>, BiddingError> {
        let player_season_ids: Vec<String> = PlayerTeamSeasons::find()
            .filter(player_team_seasons::Column::TeamSeasonId.eq(team_season_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|link| link.player_season_id)
            .collect();

        if player_season_ids.is_empty() {
            return Ok(Vec::new());
        }

        let seasons = PlayerSeasons::find()
            .filter(player_seasons::Column::Id.is_in(player_season_ids))
            .all(&self.db)
            .await?;

        let players = self
            .players_by_id(seasons.iter().map(|ps| ps.player_id.clone()).collect())
            .await?;
        let contracts = self
            .contracts_by_id(seasons.iter().map(|ps| ps.contract_id.clone()).collect())
            .await?;

        Ok(seasons
            .into_iter()
            .map(|ps| {
                let player = players.get(&ps.player_id);
                let name = player.map(|p| p.name.clone()).unwrap_or_default();
                let gamertag = player
                    .and_then(|p| p.gamertag.clone())
                    .unwrap_or_else(|| name.clone());
                RosterPlayer {
                    contract_amount: contracts.get(&ps.contract_id).map(|c| c.amount).unwrap_or(0),
                    id: ps.id,
                    name,
                    position: ps.position,
                    gamertag,
                }
            })
            .collect())
    }

    async fn eligible_players(&self, tier: &TierInfo) -> Result<Vec<EligiblePlayer>, BiddingError> {
        let flagged = PlayerSeasons::find()
            .filter(player_seasons::Column::SeasonId.eq(tier.season_id.as_str()))
            .filter(player_seasons::Column::IsInBidding.eq(true))
            .all(&self.db)
            .await?;

        let rostered = self.rostered_in_tier(&tier.id).await?;
        let candidates: Vec<player_seasons::Model> = flagged
            .into_iter()
            .filter(|ps| !rostered.contains(&ps.id))
            .collect();

        let players = self
            .players_by_id(candidates.iter().map(|ps| ps.player_id.clone()).collect())
            .await?;
        let contracts = self
            .contracts_by_id(candidates.iter().map(|ps| ps.contract_id.clone()).collect())
            .await?;

        let mut eligible = Vec::with_capacity(candidates.len());
        for ps in candidates {
            let Some(contract) = contracts.get(&ps.contract_id) else {
                warn!(player_season_id = %ps.id, contract_id = %ps.contract_id, "Eligible player has no contract, skipping");
                continue;
            };
            let player = players.get(&ps.player_id);
            eligible.push(EligiblePlayer {
                player_name: player.map(|p| p.name.clone()).unwrap_or_default(),
                gamertag: player.and_then(|p| p.gamertag.clone()),
                position: ps.position,
                contract_id: ps.contract_id,
                contract_amount: contract.amount,
                stats: PlayerStats {
                    games_played: ps.games_played,
                    goals: ps.goals,
                    assists: ps.assists,
                    plus_minus: ps.plus_minus,
                },
                player_season_id: ps.id,
            });
        }

        debug!(tier = %tier.name, count = eligible.len(), "Loaded eligible players");
        Ok(eligible)
    }

    async fn flagged_players(&self, season_id: &str) -> Result<Vec<FlaggedPlayer>, BiddingError> {
        let flagged = PlayerSeasons::find()
            .filter(player_seasons::Column::SeasonId.eq(season_id))
            .filter(player_seasons::Column::IsInBidding.eq(true))
            .all(&self.db)
            .await?;

        if flagged.is_empty() {
            return Ok(Vec::new());
        }

        let links = PlayerTeamSeasons::find()
            .filter(
                player_team_seasons::Column::PlayerSeasonId
                    .is_in(flagged.iter().map(|ps| ps.id.clone())),
            )
            .all(&self.db)
            .await?;

        let tier_by_team_season: HashMap<String, String> = if links.is_empty() {
            HashMap::new()
        } else {
            TeamSeasons::find()
                .filter(team_seasons::Column::Id.is_in(links.iter().map(|l| l.team_season_id.clone())))
                .all(&self.db)
                .await?
                .into_iter()
                .map(|ts| (ts.id, ts.tier_id))
                .collect()
        };

        let mut rostered: HashMap<String, Vec<String>> = HashMap::new();
        for link in links {
            if let Some(tier_id) = tier_by_team_season.get(&link.team_season_id) {
                rostered
                    .entry(link.player_season_id)
                    .or_default()
                    .push(tier_id.clone());
            }
        }

        let players = self
            .players_by_id(flagged.iter().map(|ps| ps.player_id.clone()).collect())
            .await?;

        Ok(flagged
            .into_iter()
            .map(|ps| FlaggedPlayer {
                player_name: players.get(&ps.player_id).map(|p| p.name.clone()).unwrap_or_default(),
                rostered_tier_ids: rostered.remove(&ps.id).unwrap_or_default(),
                player_season_id: ps.id,
            })
            .collect())
    }

    async fn flag_unrostered_players(&self, tier: &TierInfo) -> Result<u64, BiddingError> {
        let rostered = self.rostered_in_tier(&tier.id).await?;
        let ids: Vec<String> = PlayerSeasons::find()
            .filter(player_seasons::Column::SeasonId.eq(tier.season_id.as_str()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|ps| ps.id)
            .filter(|id| !rostered.contains(id))
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let result = PlayerSeasons::update_many()
            .set(player_seasons::ActiveModel {
                is_in_bidding: Set(true),
                ..Default::default()
            })
            .filter(player_seasons::Column::Id.is_in(ids))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn clear_bidding_flags(&self, season_id: &str) -> Result<u64, BiddingError> {
        let result = PlayerSeasons::update_many()
            .set(player_seasons::ActiveModel {
                is_in_bidding: Set(false),
                ..Default::default()
            })
            .filter(player_seasons::Column::SeasonId.eq(season_id))
            .filter(player_seasons::Column::IsInBidding.eq(true))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn clear_bidding_flag(&self, player_season_id: &str) -> Result<(), BiddingError> {
        PlayerSeasons::update_many()
            .set(player_seasons::ActiveModel {
                is_in_bidding: Set(false),
                ..Default::default()
            })
            .filter(player_seasons::Column::Id.eq(player_season_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn commit_settlement(&self, commit: &SettlementCommit) -> Result<CommitOutcome, BiddingError> {
        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        let outcome = match &commit.winner {
            None => CommitOutcome::NoWinner,
            Some(winner) => {
                let team_season = TeamSeasons::find()
                    .filter(team_seasons::Column::TeamId.eq(winner.team_id.as_str()))
                    .filter(team_seasons::Column::TierId.eq(commit.tier_id.as_str()))
                    .one(&txn)
                    .await?;

                match team_season {
                    None => CommitOutcome::MissingTeamSeason,
                    Some(team_season) => {
                        let existing = PlayerTeamSeasons::find()
                            .filter(
                                player_team_seasons::Column::PlayerSeasonId
                                    .eq(commit.player_season_id.as_str()),
                            )
                            .filter(player_team_seasons::Column::TeamSeasonId.eq(team_season.id.as_str()))
                            .one(&txn)
                            .await?;

                        if existing.is_none() {
                            player_team_seasons::ActiveModel {
                                player_season_id: Set(commit.player_season_id.clone()),
                                team_season_id: Set(team_season.id.clone()),
                                created_at: Set(now),
                                ..Default::default()
                            }
                            .insert(&txn)
                            .await?;
                        }

                        Contracts::update_many()
                            .set(contracts::ActiveModel {
                                amount: Set(winner.amount),
                                updated_at: Set(now),
                                ..Default::default()
                            })
                            .filter(contracts::Column::Id.eq(commit.contract_id.as_str()))
                            .exec(&txn)
                            .await?;

                        CommitOutcome::Assigned {
                            team_season_id: team_season.id,
                        }
                    }
                }
            }
        };

        PlayerSeasons::update_many()
            .set(player_seasons::ActiveModel {
                is_in_bidding: Set(false),
                ..Default::default()
            })
            .filter(player_seasons::Column::Id.eq(commit.player_season_id.as_str()))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(outcome)
    }

    async fn record_bid(&self, entry: &BidLedgerEntry) -> Result<(), BiddingError> {
        bids::ActiveModel {
            contract_id: Set(entry.contract_id.clone()),
            team_season_id: Set(entry.team_season_id.clone()),
            amount: Set(entry.amount),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_bids_for_tier(&self, tier_id: &str) -> Result<u64, BiddingError> {
        let team_season_ids: Vec<String> = TeamSeasons::find()
            .filter(team_seasons::Column::TierId.eq(tier_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|ts| ts.id)
            .collect();

        if team_season_ids.is_empty() {
            return Ok(0);
        }

        let result = Bids::delete_many()
            .filter(bids::Column::TeamSeasonId.is_in(team_season_ids))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
