//! League Scheduler
//!
//! One sweep runs three phases:
//! - A: finalize every active auction whose own deadline has passed
//! - B: close the active league window once its end time passes (or it has
//!   nothing to auction), then seed and open the next league in order
//! - C: reconciliation (see `reconciliation.rs`)
//! - D: purge settled records of tiers whose window is closed
//!
//! Each step re-reads state right before mutating it and treats "already
//! done" as success, so repeated or overlapping triggers are harmless. An
//! in-process guard additionally collapses overlapping triggers into one
//! sweep.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::BiddingError;
use crate::models::auction::LeagueAuctionWindow;
use crate::services::auction_engine::PlayerAuctionEngine;
use crate::services::auction_store::Mutation;
use crate::services::persistence_gateway::{LeagueRepository, TierInfo};
use crate::services::reconciliation::{ReconciliationReport, ReconciliationService};

/// When the next league's window starts: `offset_days` after the current
/// day, at `start_hour` local time in a fixed UTC offset (no DST).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextWindowPolicy {
    pub offset_days: i64,
    pub start_hour: u32,
    pub utc_offset_minutes: i32,
}

impl Default for NextWindowPolicy {
    fn default() -> Self {
        Self {
            offset_days: 1,
            start_hour: 20,
            utc_offset_minutes: -5 * 60,
        }
    }
}

impl NextWindowPolicy {
    pub fn next_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, BiddingError> {
        let zone = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            BiddingError::Config(format!("invalid UTC offset: {} minutes", self.utc_offset_minutes))
        })?;

        let local_day = now.with_timezone(&zone).date_naive() + Duration::days(self.offset_days);
        let local_start = local_day
            .and_hms_opt(self.start_hour, 0, 0)
            .ok_or_else(|| BiddingError::Config(format!("invalid start hour: {}", self.start_hour)))?;

        zone.from_local_datetime(&local_start)
            .single()
            .map(|start| start.with_timezone(&Utc))
            .ok_or_else(|| BiddingError::Config("ambiguous next window start".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// League ids in bidding order; position + 1 is the tier level
    pub league_order: Vec<String>,
    pub window_hours: i64,
    pub next_window: NextWindowPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            league_order: ["nhl", "ahl", "echl", "chl"].iter().map(|s| s.to_string()).collect(),
            window_hours: 48,
            next_window: NextWindowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub sweep_id: String,
    /// Another sweep was already running; nothing was done
    pub skipped: bool,
    pub expired_finalized: usize,
    pub expired_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_league: Option<String>,
    pub finalized_on_close: usize,
    pub purged_records: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_league: Option<String>,
    pub seeded_players: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationReport>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Activation {
    pub window: LeagueAuctionWindow,
    pub seeded: usize,
}

pub struct LeagueScheduler {
    engine: Arc<PlayerAuctionEngine>,
    repo: Arc<dyn LeagueRepository>,
    reconciliation: Arc<ReconciliationService>,
    settings: SchedulerSettings,
    sweep_guard: Mutex<()>,
}

impl LeagueScheduler {
    pub fn new(
        engine: Arc<PlayerAuctionEngine>,
        repo: Arc<dyn LeagueRepository>,
        reconciliation: Arc<ReconciliationService>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            engine,
            repo,
            reconciliation,
            settings,
            sweep_guard: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn tier_level(&self, league_id: &str) -> Option<u32> {
        let league_id = league_id.to_lowercase();
        self.settings
            .league_order
            .iter()
            .position(|l| *l == league_id)
            .map(|idx| idx as u32 + 1)
    }

    pub fn next_league(&self, league_id: &str) -> Option<&str> {
        let level = self.tier_level(league_id)? as usize;
        self.settings.league_order.get(level).map(String::as_str)
    }

    /// Run one sweep unless one is already in progress
    pub async fn trigger(&self, now: DateTime<Utc>) -> SweepReport {
        let sweep_id = Uuid::new_v4().to_string();

        let Ok(_guard) = self.sweep_guard.try_lock() else {
            info!(sweep_id = %sweep_id, "Sweep already running, skipping trigger");
            return SweepReport {
                sweep_id,
                skipped: true,
                ..Default::default()
            };
        };

        let span = info_span!("sweep", sweep_id = %sweep_id);
        self.run_sweep(sweep_id, now).instrument(span).await
    }

    async fn run_sweep(&self, sweep_id: String, now: DateTime<Utc>) -> SweepReport {
        info!(now = %now, "Starting bidding sweep");
        let mut report = SweepReport {
            sweep_id,
            ..Default::default()
        };

        if let Err(e) = self.expire_auctions(now, &mut report).await {
            error!(error = %e, "Expiry phase failed");
            report.errors.push(format!("expire: {}", e));
        }

        if let Err(e) = self.advance_windows(now, &mut report).await {
            error!(error = %e, "Window phase failed");
            report.errors.push(format!("windows: {}", e));
        }

        match self.reconciliation.run(now).await {
            Ok(reconciled) => report.reconciliation = Some(reconciled),
            Err(e) => {
                error!(error = %e, "Reconciliation phase failed");
                report.errors.push(format!("reconciliation: {}", e));
            }
        }

        match self.purge_settled().await {
            Ok(purged) => report.purged_records = purged,
            Err(e) => {
                error!(error = %e, "Purge phase failed");
                report.errors.push(format!("purge: {}", e));
            }
        }

        info!(
            expired = report.expired_finalized,
            closed = ?report.closed_league,
            activated = ?report.activated_league,
            errors = report.errors.len(),
            "Bidding sweep complete"
        );
        report
    }

    /// Phase A
    async fn expire_auctions(&self, now: DateTime<Utc>, report: &mut SweepReport) -> Result<(), BiddingError> {
        let now_ms = now.timestamp_millis();
        let expired: Vec<String> = self
            .engine
            .records()
            .all_players()
            .await?
            .into_iter()
            .filter(|r| r.is_expired(now_ms))
            .map(|r| r.player_id)
            .collect();

        debug!(count = expired.len(), "Expired auctions found");

        for player_id in expired {
            match self.engine.finalize(&player_id, now).await {
                Ok(outcome) if outcome.newly_finalized => report.expired_finalized += 1,
                Ok(_) => {}
                Err(e) => {
                    report.expired_failed += 1;
                    error!(player_id = %player_id, error = %e, "Failed to finalize expired auction");
                }
            }
        }
        Ok(())
    }

    /// Phase B
    async fn advance_windows(&self, now: DateTime<Utc>, report: &mut SweepReport) -> Result<(), BiddingError> {
        let now_ms = now.timestamp_millis();
        let active: Vec<LeagueAuctionWindow> = self
            .engine
            .records()
            .all_windows()
            .await?
            .into_iter()
            .filter(|w| w.active)
            .collect();

        if active.len() > 1 {
            warn!(
                leagues = ?active.iter().map(|w| w.league_id.as_str()).collect::<Vec<_>>(),
                "More than one league window active"
            );
        }

        // Lowest tier first
        let Some(window) = active.into_iter().next() else {
            return Ok(());
        };

        let tier = self.require_tier(&window.league_id).await?;
        let records = self.engine.records().players_in_tier(&tier.id).await?;
        let empty = records.is_empty() && window.start_time <= now_ms;

        if !window.has_ended(now_ms) && !empty {
            return Ok(());
        }

        info!(
            league_id = %window.league_id,
            end_time = window.end_time,
            empty = empty,
            "Closing league window"
        );

        let finalized = self.engine.finalize_tier(&tier.id, now).await?;
        report.finalized_on_close += finalized.processed;
        if finalized.failed > 0 {
            // Keep the window open so the next sweep retries the stragglers
            warn!(league_id = %window.league_id, failed = finalized.failed, "Window left open, auctions failed to finalize");
            report
                .errors
                .push(format!("{} auctions in {} failed to finalize", finalized.failed, window.league_id));
            return Ok(());
        }

        if !self.deactivate(&window.league_id, now).await? {
            debug!(league_id = %window.league_id, "Window already closed by another sweep");
            return Ok(());
        }
        report.closed_league = Some(window.league_id.clone());

        let Some(next_league) = self.next_league(&window.league_id).map(str::to_string) else {
            info!(league_id = %window.league_id, "Final league closed, bidding sequence complete");
            return Ok(());
        };

        let start = self.settings.next_window.next_start(now)?;
        let end = start + Duration::hours(self.settings.window_hours);
        let activation = self.activate_league(&next_league, start, end, now).await?;
        report.activated_league = Some(next_league);
        report.seeded_players = activation.seeded;
        Ok(())
    }

    async fn require_tier(&self, league_id: &str) -> Result<TierInfo, BiddingError> {
        self.repo
            .find_tier(league_id)
            .await?
            .ok_or_else(|| BiddingError::NotFound(format!("Tier not found for league {}", league_id)))
    }

    /// Seed the league's eligible players, then open its window. Seeding comes
    /// first so the window never opens without its records.
    pub async fn activate_league(
        &self,
        league_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Activation, BiddingError> {
        let league_id = league_id.to_lowercase();
        let tier_level = self
            .tier_level(&league_id)
            .ok_or_else(|| BiddingError::BadRequest(format!("Unknown league: {}", league_id)))?;
        let tier = self.require_tier(&league_id).await?;

        let eligible = self.repo.eligible_players(&tier).await?;
        let seeded = self.engine.seed_tier(&tier, eligible, now).await;

        let now_ms = now.timestamp_millis();
        let opened = LeagueAuctionWindow::new(
            &league_id,
            tier_level,
            start.timestamp_millis(),
            end.timestamp_millis(),
            now_ms,
        );

        let (window, wrote) = self
            .engine
            .records()
            .update_window(&league_id, |current| match current {
                Some(existing) if existing.active => Ok(Mutation::Unchanged),
                _ => Ok(Mutation::Write(opened.clone())),
            })
            .await?;

        let window = window.unwrap_or(opened);
        if wrote {
            info!(
                league_id = %league_id,
                tier_level = tier_level,
                start_time = window.start_time,
                end_time = window.end_time,
                seeded = seeded,
                "League window activated"
            );
        } else {
            debug!(league_id = %league_id, "League window already active");
        }

        Ok(Activation { window, seeded })
    }

    /// Returns true if this call flipped the window to inactive
    pub async fn deactivate(&self, league_id: &str, now: DateTime<Utc>) -> Result<bool, BiddingError> {
        let now_ms = now.timestamp_millis();
        let (_, wrote) = self
            .engine
            .records()
            .update_window(league_id, |current| match current {
                Some(window) if window.active => {
                    let mut closed = window.clone();
                    closed.active = false;
                    closed.last_update = now_ms;
                    Ok(Mutation::Write(closed))
                }
                _ => Ok(Mutation::Unchanged),
            })
            .await?;

        if wrote {
            info!(league_id = %league_id, "League window deactivated");
        }
        Ok(wrote)
    }

    /// Drop completed records whose relational commit is confirmed, except in
    /// tiers whose window is still active. Runs after reconciliation so
    /// settlements it confirmed are purged in the same sweep.
    async fn purge_settled(&self) -> Result<u64, BiddingError> {
        let mut open_tiers = Vec::new();
        for window in self.engine.records().all_windows().await? {
            if window.active {
                open_tiers.push(self.require_tier(&window.league_id).await?.id);
            }
        }

        let settled: Vec<String> = self
            .engine
            .records()
            .all_players()
            .await?
            .into_iter()
            .filter(|r| !r.is_active() && !r.has_pending_settlement() && !open_tiers.contains(&r.tier_id))
            .map(|r| r.player_id)
            .collect();

        let purged = self.engine.records().delete_players(&settled).await?;
        if purged > 0 {
            debug!(purged = purged, "Purged settled auction records");
        }
        Ok(purged)
    }
}
