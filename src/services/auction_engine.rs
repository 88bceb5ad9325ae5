//! Player Auction Engine
//!
//! Applies bids to a single player's English auction and finalizes it.
//! Every mutation is a compare-and-set on the player's record, so two bids
//! racing on the same player serialize instead of overwriting each other.
//!
//! Finalization is a two-step outbox: the record is marked `completed` with a
//! pending settlement in one write, then the Persistence Gateway commit runs
//! and the settlement is confirmed (or left pending for reconciliation).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{BiddingError, ValidationError};
use crate::models::auction::{
    AuctionStatus, BidEntry, NewAuction, PlayerAuctionRecord, Settlement, SettlementState,
};
use crate::models::bidding::{CommittedBid, CommittedBids};
use crate::services::auction_store::{AuctionRecords, Mutation};
use crate::services::persistence_gateway::{EligiblePlayer, PersistenceGateway, TierInfo};

/// Fixed step between successive bids
pub const BID_INCREMENT: i64 = 250_000;

/// Deadline set by the first bid on a player
pub const FIRST_BID_WINDOW_MS: i64 = 8 * 60 * 60 * 1000;

/// A later bid leaving less than this on the clock resets it to this
pub const ANTI_SNIPE_WINDOW_MS: i64 = 6 * 60 * 60 * 1000;

/// Team placing a bid
#[derive(Debug, Clone)]
pub struct Bidder {
    pub team_id: String,
    pub team_name: String,
}

/// Team that lost the lead to an accepted bid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutbidNotice {
    pub team_id: String,
    pub team_name: String,
    pub previous_amount: i64,
}

#[derive(Debug, Clone)]
pub struct BidOutcome {
    pub record: PlayerAuctionRecord,
    pub outbid: Option<OutbidNotice>,
}

#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub record: PlayerAuctionRecord,
    /// False when the auction was already completed before this call
    pub newly_finalized: bool,
}

/// Per-record tally for bulk operations; failures never stop the batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub with_winner: usize,
    pub failed: usize,
}

/// Checks a bid amount against the record. Rules run in a fixed order and
/// the first violation wins.
pub fn validate_bid(record: &PlayerAuctionRecord, amount: i64, now_ms: i64) -> Result<(), ValidationError> {
    if !record.is_active() || record.is_expired(now_ms) {
        return Err(ValidationError::AuctionClosed);
    }
    if amount <= 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    if amount % BID_INCREMENT != 0 {
        return Err(ValidationError::InvalidIncrement {
            amount,
            increment: BID_INCREMENT,
        });
    }

    match record.current_bid {
        None => {
            if amount < record.starting_amount {
                return Err(ValidationError::BelowStartingAmount {
                    amount,
                    starting_amount: record.starting_amount,
                });
            }
        }
        Some(current) => {
            let minimum = current + BID_INCREMENT;
            if amount < minimum {
                return Err(ValidationError::BelowMinimumBid {
                    amount,
                    minimum,
                    increment: BID_INCREMENT,
                });
            }
        }
    }

    Ok(())
}

/// Deadline after an accepted bid at `now_ms`
pub fn next_deadline(record: &PlayerAuctionRecord, now_ms: i64) -> i64 {
    match (&record.current_team_id, record.deadline) {
        (None, _) | (Some(_), None) => now_ms + FIRST_BID_WINDOW_MS,
        (Some(_), Some(deadline)) => {
            if deadline - now_ms < ANTI_SNIPE_WINDOW_MS {
                now_ms + ANTI_SNIPE_WINDOW_MS
            } else {
                deadline
            }
        }
    }
}

/// Pure bid application: validated copy of `record` with the bid appended
pub fn apply_bid(
    record: &PlayerAuctionRecord,
    bidder: &Bidder,
    amount: i64,
    now_ms: i64,
) -> Result<PlayerAuctionRecord, ValidationError> {
    validate_bid(record, amount, now_ms)?;

    let mut next = record.clone();
    next.deadline = Some(next_deadline(record, now_ms));
    next.bid_history.push(BidEntry {
        team_id: bidder.team_id.clone(),
        team_name: bidder.team_name.clone(),
        amount,
        timestamp: now_ms,
    });
    next.current_bid = Some(amount);
    next.current_team_id = Some(bidder.team_id.clone());
    next.current_team_name = Some(bidder.team_name.clone());
    next.status = AuctionStatus::Active;
    next.last_update = now_ms;
    Ok(next)
}

/// Completed copy of `record` carrying a pending settlement for the winner
fn complete(record: &PlayerAuctionRecord, now_ms: i64) -> PlayerAuctionRecord {
    let mut next = record.clone();
    next.status = AuctionStatus::Completed;
    next.finalized_at = Some(now_ms);
    next.last_update = now_ms;
    next.settlement = Some(Settlement {
        state: SettlementState::Pending,
        winning_team_id: record.current_team_id.clone(),
        winning_amount: record.current_team_id.as_ref().and(record.current_bid),
        attempts: 0,
        last_error: None,
        confirmed_at: None,
    });
    next
}

pub struct PlayerAuctionEngine {
    records: AuctionRecords,
    gateway: Arc<PersistenceGateway>,
}

impl PlayerAuctionEngine {
    pub fn new(records: AuctionRecords, gateway: Arc<PersistenceGateway>) -> Self {
        Self { records, gateway }
    }

    pub fn records(&self) -> &AuctionRecords {
        &self.records
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    /// Place a bid. Validation failures leave the record untouched; a
    /// concurrent winner forces a re-read and re-validation.
    pub async fn place_bid(
        &self,
        player_id: &str,
        bidder: &Bidder,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, BiddingError> {
        let now_ms = now.timestamp_millis();
        let mut outbid = None;

        let (record, _) = self
            .records
            .update_player(player_id, |current| {
                let next = apply_bid(current, bidder, amount, now_ms)?;
                outbid = match (&current.current_team_id, &current.current_team_name, current.current_bid) {
                    (Some(team_id), Some(team_name), Some(previous_amount)) if *team_id != bidder.team_id => {
                        Some(OutbidNotice {
                            team_id: team_id.clone(),
                            team_name: team_name.clone(),
                            previous_amount,
                        })
                    }
                    _ => None,
                };
                Ok(Mutation::Write(next))
            })
            .await?;

        info!(
            player_id = %player_id,
            team_id = %bidder.team_id,
            amount = amount,
            deadline = ?record.deadline,
            "Bid accepted"
        );
        if let Some(notice) = &outbid {
            info!(
                player_id = %player_id,
                outbid_team_id = %notice.team_id,
                previous_amount = notice.previous_amount,
                "Previous leader outbid"
            );
        }

        Ok(BidOutcome { record, outbid })
    }

    /// Finalize one auction. Already-completed records are returned as-is and
    /// never re-trigger the relational commit.
    pub async fn finalize(&self, player_id: &str, now: DateTime<Utc>) -> Result<FinalizeOutcome, BiddingError> {
        let now_ms = now.timestamp_millis();

        let (record, wrote) = self
            .records
            .update_player(player_id, |current| {
                if current.status == AuctionStatus::Completed {
                    Ok(Mutation::Unchanged)
                } else {
                    Ok(Mutation::Write(complete(current, now_ms)))
                }
            })
            .await?;

        if !wrote {
            debug!(player_id = %player_id, "Auction already finalized");
            return Ok(FinalizeOutcome {
                record,
                newly_finalized: false,
            });
        }

        info!(
            player_id = %player_id,
            player_name = %record.player_name,
            winner = ?record.current_team_name,
            amount = ?record.current_bid,
            "Auction finalized"
        );

        let record = self.settle(record, now).await;
        Ok(FinalizeOutcome {
            record,
            newly_finalized: true,
        })
    }

    /// Close an auction whose player was rostered outside the auction. The
    /// record is completed with a settlement that is already confirmed and
    /// names no winner, so no roster link or contract write ever follows.
    pub async fn close_unsettled(&self, player_id: &str, now: DateTime<Utc>) -> Result<FinalizeOutcome, BiddingError> {
        let now_ms = now.timestamp_millis();

        let (record, wrote) = self
            .records
            .update_player(player_id, |current| {
                if current.status == AuctionStatus::Completed {
                    return Ok(Mutation::Unchanged);
                }
                let mut next = complete(current, now_ms);
                next.settlement = Some(Settlement {
                    state: SettlementState::Confirmed,
                    winning_team_id: None,
                    winning_amount: None,
                    attempts: 0,
                    last_error: None,
                    confirmed_at: Some(now_ms),
                });
                Ok(Mutation::Write(next))
            })
            .await?;

        if wrote {
            warn!(
                player_id = %player_id,
                leader = ?record.current_team_id,
                amount = ?record.current_bid,
                "Auction closed without settlement, player already rostered"
            );
        }
        Ok(FinalizeOutcome {
            record,
            newly_finalized: wrote,
        })
    }

    /// Run the relational commit for a completed record and record the
    /// outcome on its settlement. A failed commit leaves the settlement
    /// pending for the next reconciliation pass.
    pub async fn settle(&self, record: PlayerAuctionRecord, now: DateTime<Utc>) -> PlayerAuctionRecord {
        if !record.has_pending_settlement() {
            return record;
        }

        let now_ms = now.timestamp_millis();
        let commit_error = match self.gateway.commit(&record).await {
            Ok(_) => None,
            Err(e) => {
                error!(
                    player_id = %record.player_id,
                    error = %e,
                    "Relational commit failed; settlement stays pending"
                );
                Some(e.to_string())
            }
        };

        let result = self
            .records
            .update_player(&record.player_id, |current| {
                let Some(settlement) = current.settlement.as_ref().filter(|s| s.is_pending()) else {
                    return Ok(Mutation::Unchanged);
                };
                let mut settlement = settlement.clone();
                settlement.attempts += 1;
                match &commit_error {
                    None => {
                        settlement.state = SettlementState::Confirmed;
                        settlement.confirmed_at = Some(now_ms);
                        settlement.last_error = None;
                    }
                    Some(message) => settlement.last_error = Some(message.clone()),
                }
                let mut next = current.clone();
                next.settlement = Some(settlement);
                next.last_update = now_ms;
                Ok(Mutation::Write(next))
            })
            .await;

        match result {
            Ok((updated, _)) => updated,
            Err(e) => {
                // The commit itself is idempotent; a lost bookkeeping write only
                // means the next reconciliation replays it
                warn!(player_id = %record.player_id, error = %e, "Failed to record settlement outcome");
                record
            }
        }
    }

    /// Finalize every active record of a tier regardless of deadline
    pub async fn finalize_tier(&self, tier_id: &str, now: DateTime<Utc>) -> Result<BatchReport, BiddingError> {
        let mut report = BatchReport::default();
        for record in self.records.players_in_tier(tier_id).await? {
            if !record.is_active() {
                continue;
            }
            match self.finalize(&record.player_id, now).await {
                Ok(outcome) => {
                    if outcome.newly_finalized {
                        report.processed += 1;
                        if outcome.record.current_team_id.is_some() {
                            report.with_winner += 1;
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!(player_id = %record.player_id, tier_id = %tier_id, error = %e, "Failed to finalize auction");
                }
            }
        }
        Ok(report)
    }

    /// Open auctions for every eligible player of a tier. Existing records are
    /// left alone, so seeding twice is harmless.
    pub async fn seed_tier(&self, tier: &TierInfo, players: Vec<EligiblePlayer>, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let mut created = 0;

        for player in players {
            let player_id = player.player_season_id.clone();
            let record = PlayerAuctionRecord::open(
                NewAuction {
                    player_id: player.player_season_id,
                    player_name: player.player_name,
                    gamertag: player.gamertag,
                    position: player.position,
                    contract_id: player.contract_id,
                    tier_id: tier.id.clone(),
                    tier_name: tier.name.clone(),
                    starting_amount: player.contract_amount,
                    stats: player.stats,
                },
                now_ms,
            );

            match self.records.create_player(&record).await {
                Ok(true) => created += 1,
                Ok(false) => debug!(player_id = %player_id, "Auction record already exists"),
                Err(e) => error!(player_id = %player_id, error = %e, "Failed to seed auction record"),
            }
        }

        info!(tier = %tier.name, created = created, "Seeded auction records");
        created
    }

    /// Active auctions the team currently leads
    pub async fn committed_bids(&self, team_id: &str) -> Result<CommittedBids, BiddingError> {
        let active_bids: Vec<CommittedBid> = self
            .records
            .all_players()
            .await?
            .into_iter()
            .filter(|r| r.is_active() && r.current_team_id.as_deref() == Some(team_id))
            .filter_map(|r| {
                r.current_bid.map(|amount| CommittedBid {
                    player_season_id: r.player_id,
                    player_name: r.player_name,
                    position: r.position,
                    amount,
                    deadline: r.deadline,
                })
            })
            .collect();

        Ok(CommittedBids {
            total_committed: active_bids.iter().map(|b| b.amount).sum(),
            active_bids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auction::PlayerStats;

    fn record(starting_amount: i64) -> PlayerAuctionRecord {
        PlayerAuctionRecord::open(
            NewAuction {
                player_id: "ps-1".to_string(),
                player_name: "Skater".to_string(),
                gamertag: None,
                position: "C".to_string(),
                contract_id: "c-1".to_string(),
                tier_id: "tier-1".to_string(),
                tier_name: "NHL".to_string(),
                starting_amount,
                stats: PlayerStats::default(),
            },
            0,
        )
    }

    fn bidder(id: &str) -> Bidder {
        Bidder {
            team_id: id.to_string(),
            team_name: format!("Team {}", id),
        }
    }

    const HOUR: i64 = 60 * 60 * 1000;

    #[test]
    fn test_first_bid_must_reach_starting_amount() {
        let r = record(500_000);
        assert_eq!(
            validate_bid(&r, 250_000, 0),
            Err(ValidationError::BelowStartingAmount {
                amount: 250_000,
                starting_amount: 500_000
            })
        );
        assert!(validate_bid(&r, 500_000, 0).is_ok());
    }

    #[test]
    fn test_off_increment_bid_fails_increment_rule_before_minimum() {
        let r = apply_bid(&record(500_000), &bidder("a"), 500_000, 0).unwrap();
        // 700,000 is also below the minimum, but the increment rule runs first
        assert!(matches!(
            validate_bid(&r, 650_000, 1),
            Err(ValidationError::InvalidIncrement { .. })
        ));
        assert!(matches!(
            validate_bid(&r, 700_000, 1),
            Err(ValidationError::InvalidIncrement { .. })
        ));
        assert!(validate_bid(&r, 750_000, 1).is_ok());
    }

    #[test]
    fn test_multiple_of_increment_below_minimum() {
        let r = apply_bid(&record(500_000), &bidder("a"), 500_000, 0).unwrap();
        for amount in [250_000, 500_000] {
            assert_eq!(
                validate_bid(&r, amount, 1),
                Err(ValidationError::BelowMinimumBid {
                    amount,
                    minimum: 750_000,
                    increment: BID_INCREMENT
                })
            );
        }
    }

    #[test]
    fn test_first_bid_sets_eight_hour_deadline() {
        let now = 1_000_000;
        let r = apply_bid(&record(500_000), &bidder("a"), 500_000, now).unwrap();
        assert_eq!(r.deadline, Some(now + 8 * HOUR));
        assert_eq!(r.current_team_id.as_deref(), Some("a"));
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_late_bid_resets_to_six_hours() {
        let first = apply_bid(&record(500_000), &bidder("a"), 500_000, 0).unwrap();
        // 3h later: 5h left, below the 6h floor
        let now = 3 * HOUR;
        let second = apply_bid(&first, &bidder("b"), 750_000, now).unwrap();
        assert_eq!(second.deadline, Some(now + 6 * HOUR));
    }

    #[test]
    fn test_early_bid_keeps_deadline() {
        let first = apply_bid(&record(500_000), &bidder("a"), 500_000, 0).unwrap();
        // 1h later: 7h left
        let second = apply_bid(&first, &bidder("b"), 750_000, HOUR).unwrap();
        assert_eq!(second.deadline, Some(8 * HOUR));
        // exactly 6h left is not extended
        let third = apply_bid(&second, &bidder("a"), 1_000_000, 2 * HOUR).unwrap();
        assert_eq!(third.deadline, Some(8 * HOUR));
    }

    #[test]
    fn test_bid_after_deadline_rejected() {
        let first = apply_bid(&record(500_000), &bidder("a"), 500_000, 0).unwrap();
        assert_eq!(
            validate_bid(&first, 750_000, 8 * HOUR),
            Err(ValidationError::AuctionClosed)
        );
    }

    #[test]
    fn test_completed_record_rejects_bids() {
        let done = complete(&record(500_000), 10);
        assert!(done.validate().is_ok());
        assert_eq!(validate_bid(&done, 500_000, 11), Err(ValidationError::AuctionClosed));
    }

    #[test]
    fn test_complete_without_bids_has_no_winner() {
        let done = complete(&record(500_000), 10);
        let settlement = done.settlement.unwrap();
        assert!(settlement.is_pending());
        assert_eq!(settlement.winning_team_id, None);
        assert_eq!(settlement.winning_amount, None);
    }
}
