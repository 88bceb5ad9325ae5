//! Reconciliation Service
//!
//! Repairs drift between the auction cache and the relational store:
//! - replays settlements still pending after a failed relational commit
//! - clears the "in bidding" flag of players that already sit on a roster in
//!   the tier they are being auctioned in, and closes that auction if it is
//!   still running without committing its leader
//!
//! Safe to run on every sweep; it never opens new auctions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::BiddingError;
use crate::models::auction::PlayerAuctionRecord;
use crate::services::auction_engine::PlayerAuctionEngine;
use crate::services::persistence_gateway::{FlaggedPlayer, LeagueRepository};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub settlements_replayed: usize,
    pub settlements_confirmed: usize,
    pub flags_cleared: usize,
    pub auctions_finalized: usize,
    pub failures: usize,
}

/// Read-only view of cache/relational disagreement, for admins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyReport {
    /// Flagged in the database but no auction record exists
    pub flagged_not_cached: Vec<String>,
    /// Active auction exists but the database flag is cleared
    pub cached_not_flagged: Vec<String>,
    /// Active auctions past their deadline, waiting for a sweep
    pub expired_active: Vec<String>,
    /// Flagged players already rostered in the tier they are auctioned in
    pub flagged_and_rostered: Vec<String>,
    /// Completed auctions whose relational commit is not confirmed
    pub unsettled: Vec<String>,
}

impl DiscrepancyReport {
    pub fn is_clean(&self) -> bool {
        self.flagged_not_cached.is_empty()
            && self.cached_not_flagged.is_empty()
            && self.expired_active.is_empty()
            && self.flagged_and_rostered.is_empty()
            && self.unsettled.is_empty()
    }
}

pub struct ReconciliationService {
    engine: Arc<PlayerAuctionEngine>,
    repo: Arc<dyn LeagueRepository>,
}

impl ReconciliationService {
    pub fn new(engine: Arc<PlayerAuctionEngine>, repo: Arc<dyn LeagueRepository>) -> Self {
        Self { engine, repo }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReconciliationReport, BiddingError> {
        let mut report = ReconciliationReport::default();
        self.replay_settlements(now, &mut report).await?;
        self.repair_flags(now, &mut report).await?;

        if report != ReconciliationReport::default() {
            info!(
                replayed = report.settlements_replayed,
                confirmed = report.settlements_confirmed,
                flags_cleared = report.flags_cleared,
                finalized = report.auctions_finalized,
                failures = report.failures,
                "Reconciliation repaired drift"
            );
        }
        Ok(report)
    }

    async fn replay_settlements(
        &self,
        now: DateTime<Utc>,
        report: &mut ReconciliationReport,
    ) -> Result<(), BiddingError> {
        let pending: Vec<_> = self
            .engine
            .records()
            .all_players()
            .await?
            .into_iter()
            .filter(|r| r.has_pending_settlement())
            .collect();

        for record in pending {
            report.settlements_replayed += 1;
            let player_id = record.player_id.clone();
            let settled = self.engine.settle(record, now).await;
            if settled.has_pending_settlement() {
                report.failures += 1;
                warn!(
                    player_id = %player_id,
                    attempts = settled.settlement.as_ref().map(|s| s.attempts),
                    "Settlement still pending after replay"
                );
            } else {
                report.settlements_confirmed += 1;
            }
        }
        Ok(())
    }

    /// Tier of the currently active league window, if any
    async fn active_tier_id(&self) -> Result<Option<String>, BiddingError> {
        let Some(window) = self
            .engine
            .records()
            .all_windows()
            .await?
            .into_iter()
            .find(|w| w.active)
        else {
            return Ok(None);
        };
        Ok(self.repo.find_tier(&window.league_id).await?.map(|t| t.id))
    }

    /// Flagged players rostered in the tier that matters for them: the tier of
    /// their auction record, or the active window's tier when they have none.
    async fn drifted_players(
        &self,
        records: &HashMap<String, PlayerAuctionRecord>,
    ) -> Result<Vec<FlaggedPlayer>, BiddingError> {
        let Some(season_id) = self.repo.latest_season_id().await? else {
            debug!("No latest season, skipping flag repair");
            return Ok(Vec::new());
        };
        let active_tier = self.active_tier_id().await?;

        Ok(self
            .repo
            .flagged_players(&season_id)
            .await?
            .into_iter()
            .filter(|p| {
                records
                    .get(&p.player_season_id)
                    .map(|r| r.tier_id.as_str())
                    .or(active_tier.as_deref())
                    .is_some_and(|tier_id| p.is_rostered_in(tier_id))
            })
            .collect())
    }

    async fn repair_flags(&self, now: DateTime<Utc>, report: &mut ReconciliationReport) -> Result<(), BiddingError> {
        let records = self.records_by_player().await?;

        for player in self.drifted_players(&records).await? {
            warn!(
                player_id = %player.player_season_id,
                player_name = %player.player_name,
                "Player is rostered but still flagged for bidding"
            );

            if let Err(e) = self.repo.clear_bidding_flag(&player.player_season_id).await {
                report.failures += 1;
                error!(player_id = %player.player_season_id, error = %e, "Failed to clear bidding flag");
                continue;
            }
            report.flags_cleared += 1;

            if !records
                .get(&player.player_season_id)
                .is_some_and(PlayerAuctionRecord::is_active)
            {
                continue;
            }
            // The roster already decided this player; nothing goes to the relational store
            match self.engine.close_unsettled(&player.player_season_id, now).await {
                Ok(outcome) if outcome.newly_finalized => report.auctions_finalized += 1,
                Ok(_) => {}
                Err(e) => {
                    report.failures += 1;
                    error!(player_id = %player.player_season_id, error = %e, "Failed to close drifted auction");
                }
            }
        }
        Ok(())
    }

    async fn records_by_player(&self) -> Result<HashMap<String, PlayerAuctionRecord>, BiddingError> {
        Ok(self
            .engine
            .records()
            .all_players()
            .await?
            .into_iter()
            .map(|r| (r.player_id.clone(), r))
            .collect())
    }

    pub async fn discrepancies(&self, now: DateTime<Utc>) -> Result<DiscrepancyReport, BiddingError> {
        let now_ms = now.timestamp_millis();
        let records = self.records_by_player().await?;
        let flagged = match self.repo.latest_season_id().await? {
            Some(season_id) => self.repo.flagged_players(&season_id).await?,
            None => Vec::new(),
        };
        let flagged_ids: HashSet<&str> = flagged.iter().map(|p| p.player_season_id.as_str()).collect();

        let mut report = DiscrepancyReport {
            flagged_not_cached: flagged
                .iter()
                .filter(|p| !records.contains_key(&p.player_season_id))
                .map(|p| p.player_season_id.clone())
                .collect(),
            cached_not_flagged: records
                .values()
                .filter(|r| r.is_active() && !flagged_ids.contains(r.player_id.as_str()))
                .map(|r| r.player_id.clone())
                .collect(),
            expired_active: records
                .values()
                .filter(|r| r.is_expired(now_ms))
                .map(|r| r.player_id.clone())
                .collect(),
            flagged_and_rostered: self
                .drifted_players(&records)
                .await?
                .into_iter()
                .map(|p| p.player_season_id)
                .collect(),
            unsettled: records
                .values()
                .filter(|r| r.has_pending_settlement())
                .map(|r| r.player_id.clone())
                .collect(),
        };

        report.flagged_not_cached.sort();
        report.cached_not_flagged.sort();
        report.expired_active.sort();
        report.flagged_and_rostered.sort();
        report.unsettled.sort();
        Ok(report)
    }
}
