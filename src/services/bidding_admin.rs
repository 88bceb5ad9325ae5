//! Admin operations over the bidding sequence: start/stop/finalize a league
//! by hand, inspect window status and wipe state for a fresh run.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::BiddingError;
use crate::models::bidding::{
    AdminStatusResponse, BiddingAction, ManageBiddingResponse, ResetRequest, ResetResponse, ResetResults,
};
use crate::services::auction_engine::PlayerAuctionEngine;
use crate::services::league_scheduler::LeagueScheduler;
use crate::services::persistence_gateway::{LeagueRepository, TierInfo};

/// Keys removed per store delete call during a reset
pub const RESET_BATCH_SIZE: usize = 100;

pub struct BiddingAdmin {
    engine: Arc<PlayerAuctionEngine>,
    scheduler: Arc<LeagueScheduler>,
    repo: Arc<dyn LeagueRepository>,
}

impl BiddingAdmin {
    pub fn new(
        engine: Arc<PlayerAuctionEngine>,
        scheduler: Arc<LeagueScheduler>,
        repo: Arc<dyn LeagueRepository>,
    ) -> Self {
        Self {
            engine,
            scheduler,
            repo,
        }
    }

    async fn require_tier(&self, league_id: &str) -> Result<TierInfo, BiddingError> {
        self.repo
            .find_tier(league_id)
            .await?
            .ok_or_else(|| BiddingError::NotFound("Tier not found".to_string()))
    }

    pub async fn manage(
        &self,
        action: BiddingAction,
        league_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ManageBiddingResponse, BiddingError> {
        let league_id = league_id.trim().to_lowercase();
        if league_id.is_empty() {
            return Err(BiddingError::BadRequest("Missing required fields".to_string()));
        }
        let tier = self.require_tier(&league_id).await?;

        match action {
            BiddingAction::Start => self.start(&league_id, now).await,
            BiddingAction::Stop => {
                self.scheduler.deactivate(&league_id, now).await?;
                Ok(ManageBiddingResponse {
                    success: true,
                    message: format!("Bidding stopped for {}", league_id.to_uppercase()),
                    processed_players: None,
                })
            }
            BiddingAction::Finalize => {
                let report = self.engine.finalize_tier(&tier.id, now).await?;
                if report.failed > 0 {
                    warn!(league_id = %league_id, failed = report.failed, "Some auctions failed to finalize");
                }
                self.scheduler.deactivate(&league_id, now).await?;
                info!(
                    league_id = %league_id,
                    processed = report.processed,
                    with_winner = report.with_winner,
                    "League finalized by admin"
                );
                Ok(ManageBiddingResponse {
                    success: report.failed == 0,
                    message: format!("Bidding finalized for {}", league_id.to_uppercase()),
                    processed_players: Some(report.processed),
                })
            }
        }
    }

    async fn start(&self, league_id: &str, now: DateTime<Utc>) -> Result<ManageBiddingResponse, BiddingError> {
        if let Some(active) = self
            .engine
            .records()
            .all_windows()
            .await?
            .into_iter()
            .find(|w| w.active && w.league_id != league_id)
        {
            return Err(BiddingError::Conflict(format!(
                "Cannot start bidding for {} while {} is active",
                league_id, active.league_id
            )));
        }

        let end = now + Duration::hours(self.scheduler.settings().window_hours);
        let activation = self.scheduler.activate_league(league_id, now, end, now).await?;

        Ok(ManageBiddingResponse {
            success: true,
            message: format!("Bidding started for {}", league_id.to_uppercase()),
            processed_players: Some(activation.seeded),
        })
    }

    pub async fn status(&self) -> Result<AdminStatusResponse, BiddingError> {
        let windows = self.engine.records().all_windows().await?;
        let active_bidding = windows.iter().find(|w| w.active).cloned();
        let bidding_status: BTreeMap<_, _> = windows.into_iter().map(|w| (w.league_id.clone(), w)).collect();

        Ok(AdminStatusResponse {
            bidding_status,
            active_bidding,
        })
    }

    /// Wipe auction state. Pending settlements are replayed first; any that
    /// still fail block the reset unless `drop_unsettled` is set.
    pub async fn reset(&self, request: &ResetRequest, now: DateTime<Utc>) -> Result<ResetResponse, BiddingError> {
        let league_id = request.league_id.trim().to_lowercase();
        let records = self.engine.records();
        let mut results = ResetResults::default();

        let mut unsettled = Vec::new();
        for record in records.all_players().await? {
            if !record.has_pending_settlement() {
                continue;
            }
            let record = self.engine.settle(record, now).await;
            if record.has_pending_settlement() {
                unsettled.push(record.player_id);
            } else {
                results.settlements_confirmed += 1;
            }
        }

        if !unsettled.is_empty() {
            if !request.drop_unsettled {
                warn!(count = unsettled.len(), players = ?unsettled, "Reset refused, settlements still pending");
                return Err(BiddingError::Conflict(format!(
                    "{} completed auctions have not been committed; retry later or set dropUnsettled",
                    unsettled.len()
                )));
            }
            warn!(count = unsettled.len(), players = ?unsettled, "Reset drops unsettled auctions");
            results.unsettled_dropped = unsettled.len();
        }

        // Corrupt records are skipped by listings, so delete by key instead
        let player_keys = records.store().scan(&records.player_prefix()).await?;
        for batch in player_keys.chunks(RESET_BATCH_SIZE) {
            results.bidding_keys_deleted += records.store().delete(batch).await?;
        }

        let window_keys = records.store().scan(&records.window_prefix()).await?;
        for batch in window_keys.chunks(RESET_BATCH_SIZE) {
            results.status_keys_deleted += records.store().delete(batch).await?;
        }

        if request.reset_database {
            let tier = self.require_tier(&league_id).await?;
            results.bids_deleted = self.repo.delete_bids_for_tier(&tier.id).await?;
            results.player_bidding_flags_reset = self.repo.clear_bidding_flags(&tier.season_id).await?;
        }

        if request.reinitialize {
            let tier = self.require_tier(&league_id).await?;
            let flagged = self.repo.flag_unrostered_players(&tier).await?;
            info!(league_id = %league_id, flagged = flagged, "Flagged unrostered players for bidding");

            let end = now + Duration::hours(self.scheduler.settings().window_hours);
            let activation = self.scheduler.activate_league(&league_id, now, end, now).await?;
            results.players_initialized = activation.seeded;
        }

        info!(
            league_id = %league_id,
            bidding_keys = results.bidding_keys_deleted,
            status_keys = results.status_keys_deleted,
            bids = results.bids_deleted,
            flags = results.player_bidding_flags_reset,
            initialized = results.players_initialized,
            confirmed = results.settlements_confirmed,
            dropped = results.unsettled_dropped,
            "Bidding reset complete"
        );

        let message = if request.reinitialize {
            format!("Bidding data reset and {} reinitialized", league_id.to_uppercase())
        } else {
            "Bidding data reset".to_string()
        };

        Ok(ResetResponse {
            success: true,
            message,
            results,
        })
    }
}
