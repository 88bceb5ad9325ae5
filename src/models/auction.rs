//! Auction records kept in the AuctionStore
//!
//! Records are versioned and validated at the store boundary: unknown fields,
//! absent nullable fields and broken invariants are rejected instead of being
//! defaulted later in business logic.

use serde::{Deserialize, Deserializer, Serialize};

/// Current schema version for every record written by this service
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Nullable but required: the field has to be present, `null` is allowed.
fn required<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BidEntry {
    pub team_id: String,
    pub team_name: String,
    pub amount: i64,
    /// epoch ms
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlayerStats {
    pub games_played: i32,
    pub goals: i32,
    pub assists: i32,
    pub plus_minus: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementState {
    /// Relational commit not yet confirmed
    Pending,
    Confirmed,
}

/// Outbox entry written in the same store write that completes the auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settlement {
    pub state: SettlementState,
    #[serde(deserialize_with = "required")]
    pub winning_team_id: Option<String>,
    #[serde(deserialize_with = "required")]
    pub winning_amount: Option<i64>,
    pub attempts: u32,
    #[serde(deserialize_with = "required")]
    pub last_error: Option<String>,
    #[serde(deserialize_with = "required")]
    pub confirmed_at: Option<i64>,
}

impl Settlement {
    pub fn is_pending(&self) -> bool {
        self.state == SettlementState::Pending
    }
}

/// One player's English auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlayerAuctionRecord {
    pub schema_version: u32,
    /// player-season id
    pub player_id: String,
    pub player_name: String,
    #[serde(deserialize_with = "required")]
    pub gamertag: Option<String>,
    pub position: String,
    pub contract_id: String,
    pub tier_id: String,
    pub tier_name: String,
    pub starting_amount: i64,
    #[serde(deserialize_with = "required")]
    pub current_bid: Option<i64>,
    #[serde(deserialize_with = "required")]
    pub current_team_id: Option<String>,
    #[serde(deserialize_with = "required")]
    pub current_team_name: Option<String>,
    #[serde(deserialize_with = "required")]
    pub deadline: Option<i64>,
    pub bid_history: Vec<BidEntry>,
    pub status: AuctionStatus,
    pub stats: PlayerStats,
    pub last_update: i64,
    #[serde(deserialize_with = "required")]
    pub finalized_at: Option<i64>,
    #[serde(deserialize_with = "required")]
    pub settlement: Option<Settlement>,
}

/// Seed data for a freshly opened auction
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub player_id: String,
    pub player_name: String,
    pub gamertag: Option<String>,
    pub position: String,
    pub contract_id: String,
    pub tier_id: String,
    pub tier_name: String,
    pub starting_amount: i64,
    pub stats: PlayerStats,
}

impl PlayerAuctionRecord {
    pub fn open(seed: NewAuction, now_ms: i64) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            player_id: seed.player_id,
            player_name: seed.player_name,
            gamertag: seed.gamertag,
            position: seed.position,
            contract_id: seed.contract_id,
            tier_id: seed.tier_id,
            tier_name: seed.tier_name,
            starting_amount: seed.starting_amount,
            current_bid: None,
            current_team_id: None,
            current_team_name: None,
            deadline: None,
            bid_history: Vec::new(),
            status: AuctionStatus::Active,
            stats: seed.stats,
            last_update: now_ms,
            finalized_at: None,
            settlement: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AuctionStatus::Active
    }

    pub fn has_pending_settlement(&self) -> bool {
        self.settlement.as_ref().is_some_and(Settlement::is_pending)
    }

    /// Active auction whose individual deadline has passed
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.is_active() && self.deadline.is_some_and(|deadline| deadline <= now_ms)
    }

    /// Structural invariants every stored record must satisfy
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != RECORD_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {})",
                self.schema_version, RECORD_SCHEMA_VERSION
            ));
        }
        if self.player_id.is_empty() || self.tier_id.is_empty() {
            return Err("player and tier ids must be set".to_string());
        }
        if self.starting_amount < 0 {
            return Err("starting amount cannot be negative".to_string());
        }

        match self.bid_history.last() {
            None => {
                if self.current_bid.is_some()
                    || self.current_team_id.is_some()
                    || self.deadline.is_some()
                {
                    return Err("current bid, leader and deadline require a bid history".to_string());
                }
            }
            Some(last) => {
                if self.current_bid != Some(last.amount) {
                    return Err("current bid does not match the last bid".to_string());
                }
                if self.current_team_id.as_deref() != Some(last.team_id.as_str()) {
                    return Err("current leader does not match the last bidder".to_string());
                }
                if self.deadline.is_none() {
                    return Err("deadline missing although bids exist".to_string());
                }
            }
        }

        if self
            .bid_history
            .windows(2)
            .any(|pair| pair[1].amount < pair[0].amount)
        {
            return Err("bid history amounts decrease".to_string());
        }

        match self.status {
            AuctionStatus::Active => {
                if self.finalized_at.is_some() || self.settlement.is_some() {
                    return Err("active auction carries finalization data".to_string());
                }
            }
            AuctionStatus::Completed => {
                if self.finalized_at.is_none() || self.settlement.is_none() {
                    return Err("completed auction without finalization data".to_string());
                }
            }
        }

        Ok(())
    }
}

/// Bidding window for one league tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LeagueAuctionWindow {
    pub schema_version: u32,
    pub league_id: String,
    pub active: bool,
    /// epoch ms
    pub start_time: i64,
    /// epoch ms
    pub end_time: i64,
    pub tier_level: u32,
    pub last_update: i64,
}

impl LeagueAuctionWindow {
    pub fn new(league_id: &str, tier_level: u32, start_time: i64, end_time: i64, now_ms: i64) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            league_id: league_id.to_string(),
            active: true,
            start_time,
            end_time,
            tier_level,
            last_update: now_ms,
        }
    }

    /// Accepting bids right now
    pub fn is_open(&self, now_ms: i64) -> bool {
        self.active && self.start_time <= now_ms
    }

    pub fn has_ended(&self, now_ms: i64) -> bool {
        self.end_time <= now_ms
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != RECORD_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {})",
                self.schema_version, RECORD_SCHEMA_VERSION
            ));
        }
        if self.active && self.end_time < self.start_time {
            return Err("window ends before it starts".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed() -> NewAuction {
        NewAuction {
            player_id: "ps-1".to_string(),
            player_name: "Skater One".to_string(),
            gamertag: None,
            position: "C".to_string(),
            contract_id: "c-1".to_string(),
            tier_id: "tier-nhl".to_string(),
            tier_name: "NHL".to_string(),
            starting_amount: 500_000,
            stats: PlayerStats::default(),
        }
    }

    #[test]
    fn test_open_record_is_valid() {
        let record = PlayerAuctionRecord::open(seed(), 1_000);
        assert!(record.validate().is_ok());
        assert!(record.is_active());
        assert!(!record.is_expired(i64::MAX));
    }

    #[test]
    fn test_serialized_shape_uses_camel_case() {
        let record = PlayerAuctionRecord::open(seed(), 1_000);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["startingAmount"], json!(500_000));
        assert_eq!(value["currentBid"], serde_json::Value::Null);
        assert_eq!(value["status"], json!("active"));
    }

    #[test]
    fn test_missing_nullable_field_is_rejected() {
        let record = PlayerAuctionRecord::open(seed(), 1_000);
        let mut value = serde_json::to_value(&record).unwrap();
        value.as_object_mut().unwrap().remove("deadline");
        let parsed: Result<PlayerAuctionRecord, _> = serde_json::from_value(value);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let record = PlayerAuctionRecord::open(seed(), 1_000);
        let mut value = serde_json::to_value(&record).unwrap();
        value["legacyEndTime"] = json!(12345);
        let parsed: Result<PlayerAuctionRecord, _> = serde_json::from_value(value);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_rejects_deadline_without_bids() {
        let mut record = PlayerAuctionRecord::open(seed(), 1_000);
        record.deadline = Some(5_000);
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_decreasing_history() {
        let mut record = PlayerAuctionRecord::open(seed(), 1_000);
        record.bid_history = vec![
            BidEntry {
                team_id: "a".into(),
                team_name: "A".into(),
                amount: 750_000,
                timestamp: 1,
            },
            BidEntry {
                team_id: "b".into(),
                team_name: "B".into(),
                amount: 500_000,
                timestamp: 2,
            },
        ];
        record.current_bid = Some(500_000);
        record.current_team_id = Some("b".into());
        record.current_team_name = Some("B".into());
        record.deadline = Some(10);
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_future_schema() {
        let mut record = PlayerAuctionRecord::open(seed(), 1_000);
        record.schema_version = RECORD_SCHEMA_VERSION + 1;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_window_open_requires_start() {
        let window = LeagueAuctionWindow::new("ahl", 2, 10_000, 20_000, 0);
        assert!(!window.is_open(5_000));
        assert!(window.is_open(10_000));
        assert!(!window.has_ended(19_999));
        assert!(window.has_ended(20_000));
    }
}
