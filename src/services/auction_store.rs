//! Auction Store
//!
//! Key-value storage for per-player auction records and per-league windows.
//! Every value carries a version that increases on each write, so callers can
//! replace read-then-write sequences with compare-and-set.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::BiddingError;
use crate::models::auction::{LeagueAuctionWindow, PlayerAuctionRecord};

/// Attempts before a contended compare-and-set gives up
pub const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Raw stored value plus its write version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub version: u64,
    pub value: serde_json::Value,
}

#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError>;

    /// Unconditional write, returns the new version
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<u64, StoreError>;

    /// Write only if the stored version still equals `expected`
    /// (`None` = key must not exist). Returns false when someone else won.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: serde_json::Value,
    ) -> Result<bool, StoreError>;

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Returns the number of keys actually removed
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;
}

/// Process-local store, used for single-instance deployments and tests
#[derive(Default)]
pub struct MemoryAuctionStore {
    entries: RwLock<HashMap<String, VersionedValue>>,
}

impl MemoryAuctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AuctionStore for MemoryAuctionStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<u64, StoreError> {
        let mut entries = self.entries.write();
        let version = entries.get(key).map(|v| v.version + 1).unwrap_or(1);
        entries.insert(key.to_string(), VersionedValue { version, value });
        Ok(version)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.write();
        let current = entries.get(key).map(|v| v.version);
        if current != expected {
            return Ok(false);
        }
        let version = current.map(|v| v + 1).unwrap_or(1);
        entries.insert(key.to_string(), VersionedValue { version, value });
        Ok(true)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut entries = self.entries.write();
        Ok(keys.iter().filter(|k| entries.remove(k.as_str()).is_some()).count() as u64)
    }
}

/// A typed record and the version it was read at
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

/// Outcome of a read-modify-write step
pub enum Mutation<T> {
    /// Persist this new value
    Write(T),
    /// Already in the target state, nothing to write
    Unchanged,
}

/// Typed access to auction records with schema validation and CAS updates
#[derive(Clone)]
pub struct AuctionRecords {
    store: Arc<dyn AuctionStore>,
    namespace: String,
}

impl AuctionRecords {
    pub fn new(store: Arc<dyn AuctionStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.trim_end_matches(':').to_string(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AuctionStore> {
        &self.store
    }

    pub fn player_prefix(&self) -> String {
        format!("{}:player:", self.namespace)
    }

    pub fn window_prefix(&self) -> String {
        format!("{}:league:", self.namespace)
    }

    pub fn player_key(&self, player_id: &str) -> String {
        format!("{}{}", self.player_prefix(), player_id)
    }

    pub fn window_key(&self, league_id: &str) -> String {
        format!("{}{}", self.window_prefix(), league_id.to_lowercase())
    }

    // ---- players ----

    pub async fn load_player(
        &self,
        player_id: &str,
    ) -> Result<Option<Versioned<PlayerAuctionRecord>>, BiddingError> {
        let key = self.player_key(player_id);
        let loaded: Option<Versioned<PlayerAuctionRecord>> = self.load(&key).await?;
        match loaded {
            Some(v) => {
                v.record
                    .validate()
                    .map_err(|reason| BiddingError::CorruptRecord { key, reason })?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    pub async fn player_ids(&self) -> Result<Vec<String>, BiddingError> {
        let prefix = self.player_prefix();
        let keys = self.store.scan(&prefix).await?;
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect())
    }

    /// Every readable player record. Corrupt records are logged and skipped so
    /// one bad entry cannot block a listing or a sweep.
    pub async fn all_players(&self) -> Result<Vec<PlayerAuctionRecord>, BiddingError> {
        let mut records = Vec::new();
        for player_id in self.player_ids().await? {
            match self.load_player(&player_id).await {
                Ok(Some(v)) => records.push(v.record),
                Ok(None) => {}
                Err(BiddingError::CorruptRecord { key, reason }) => {
                    warn!(key = %key, reason = %reason, "Skipping corrupt auction record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    pub async fn players_in_tier(&self, tier_id: &str) -> Result<Vec<PlayerAuctionRecord>, BiddingError> {
        let mut records: Vec<PlayerAuctionRecord> = self
            .all_players()
            .await?
            .into_iter()
            .filter(|r| r.tier_id == tier_id)
            .collect();
        records.sort_by(|a, b| a.player_name.cmp(&b.player_name));
        Ok(records)
    }

    /// Create the record only if no record exists for the player yet
    pub async fn create_player(&self, record: &PlayerAuctionRecord) -> Result<bool, BiddingError> {
        let key = self.player_key(&record.player_id);
        let value = to_value(record)?;
        Ok(self.store.compare_and_set(&key, None, value).await?)
    }

    /// Read-modify-write a player record with optimistic concurrency.
    ///
    /// `mutate` sees the latest stored record on every attempt; it may reject
    /// (error, nothing written), declare the record already in its target
    /// state, or return the replacement. Returns the record as stored
    /// afterwards and whether this call wrote it.
    pub async fn update_player<F>(
        &self,
        player_id: &str,
        mut mutate: F,
    ) -> Result<(PlayerAuctionRecord, bool), BiddingError>
    where
        F: FnMut(&PlayerAuctionRecord) -> Result<Mutation<PlayerAuctionRecord>, BiddingError> + Send,
    {
        let key = self.player_key(player_id);
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self
                .load_player(player_id)
                .await?
                .ok_or_else(|| BiddingError::NotFound("Player not found in bidding".to_string()))?;

            let next = match mutate(&current.record)? {
                Mutation::Unchanged => return Ok((current.record, false)),
                Mutation::Write(next) => next,
            };
            next.validate()
                .map_err(|reason| BiddingError::CorruptRecord { key: key.clone(), reason })?;

            if self
                .store
                .compare_and_set(&key, Some(current.version), to_value(&next)?)
                .await?
            {
                return Ok((next, true));
            }
            debug!(player_id = %player_id, attempt = attempt, "Concurrent update detected, retrying");
        }

        warn!(player_id = %player_id, "Gave up on contended auction record");
        Err(BiddingError::TransientStore(format!(
            "record {} is under heavy contention, try again",
            key
        )))
    }

    pub async fn delete_players(&self, player_ids: &[String]) -> Result<u64, BiddingError> {
        if player_ids.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = player_ids.iter().map(|id| self.player_key(id)).collect();
        Ok(self.store.delete(&keys).await?)
    }

    // ---- windows ----

    pub async fn load_window(
        &self,
        league_id: &str,
    ) -> Result<Option<Versioned<LeagueAuctionWindow>>, BiddingError> {
        let key = self.window_key(league_id);
        let loaded: Option<Versioned<LeagueAuctionWindow>> = self.load(&key).await?;
        match loaded {
            Some(v) => {
                v.record
                    .validate()
                    .map_err(|reason| BiddingError::CorruptRecord { key, reason })?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    pub async fn all_windows(&self) -> Result<Vec<LeagueAuctionWindow>, BiddingError> {
        let prefix = self.window_prefix();
        let mut windows = Vec::new();
        for key in self.store.scan(&prefix).await? {
            let Some(league_id) = key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            match self.load_window(league_id).await {
                Ok(Some(v)) => windows.push(v.record),
                Ok(None) => {}
                Err(BiddingError::CorruptRecord { key, reason }) => {
                    warn!(key = %key, reason = %reason, "Skipping corrupt league window");
                }
                Err(e) => return Err(e),
            }
        }
        windows.sort_by_key(|w| w.tier_level);
        Ok(windows)
    }

    /// Same contract as `update_player`; `None` means the window does not exist yet
    pub async fn update_window<F>(
        &self,
        league_id: &str,
        mut mutate: F,
    ) -> Result<(Option<LeagueAuctionWindow>, bool), BiddingError>
    where
        F: FnMut(Option<&LeagueAuctionWindow>) -> Result<Mutation<LeagueAuctionWindow>, BiddingError>
            + Send,
    {
        let key = self.window_key(league_id);
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.load_window(league_id).await?;
            let (version, existing) = match &current {
                Some(v) => (Some(v.version), Some(&v.record)),
                None => (None, None),
            };

            let next = match mutate(existing)? {
                Mutation::Unchanged => return Ok((current.map(|v| v.record), false)),
                Mutation::Write(next) => next,
            };
            next.validate()
                .map_err(|reason| BiddingError::CorruptRecord { key: key.clone(), reason })?;

            if self
                .store
                .compare_and_set(&key, version, to_value(&next)?)
                .await?
            {
                return Ok((Some(next), true));
            }
            debug!(league_id = %league_id, attempt = attempt, "Concurrent window update detected, retrying");
        }

        Err(BiddingError::TransientStore(format!(
            "window {} is under heavy contention, try again",
            key
        )))
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Versioned<T>>, BiddingError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_value::<T>(raw.value).map_err(|e| BiddingError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(Versioned {
            version: raw.version,
            record,
        }))
    }
}

fn to_value<T: Serialize>(record: &T) -> Result<serde_json::Value, BiddingError> {
    serde_json::to_value(record)
        .map_err(|e| BiddingError::from(StoreError::Serialization(e.to_string())))
}
