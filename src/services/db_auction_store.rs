//! Postgres-backed AuctionStore
//!
//! Stores each auction value as a JSONB row keyed by its cache key. The
//! `version` column gives compare-and-set semantics through a conditional
//! UPDATE (or an INSERT guarded by the primary key for new keys).

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QuerySelect, Set, SqlErr,
};
use tracing::debug;

use crate::entities::auction_records::{self, Entity as AuctionRecordEntity};
use crate::services::auction_store::{AuctionStore, StoreError, VersionedValue, MAX_CAS_ATTEMPTS};

#[derive(Clone)]
pub struct DbAuctionStore {
    db: DatabaseConnection,
}

impl DbAuctionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn backend(e: DbErr) -> StoreError {
    StoreError::Backend(format!("Database error: {}", e))
}

#[async_trait]
impl AuctionStore for DbAuctionStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        let row = AuctionRecordEntity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(backend)?;

        Ok(row.map(|r| VersionedValue {
            version: r.version as u64,
            value: r.value,
        }))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<u64, StoreError> {
        // Unconditional writes still go through CAS so concurrent setters
        // cannot interleave a version number
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.get(key).await?.map(|v| v.version);
            if self.compare_and_set(key, current, value.clone()).await? {
                return Ok(current.map(|v| v + 1).unwrap_or(1));
            }
        }
        Err(StoreError::Backend(format!("could not write {} under contention", key)))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let now = Utc::now().fixed_offset();

        match expected {
            None => {
                let row = auction_records::ActiveModel {
                    key: Set(key.to_string()),
                    value: Set(value),
                    version: Set(1),
                    updated_at: Set(now),
                };
                match row.insert(&self.db).await {
                    Ok(_) => Ok(true),
                    Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                        debug!(key = %key, "Insert lost race, key already exists");
                        Ok(false)
                    }
                    Err(e) => Err(backend(e)),
                }
            }
            Some(version) => {
                let result = AuctionRecordEntity::update_many()
                    .set(auction_records::ActiveModel {
                        value: Set(value),
                        version: Set(version as i64 + 1),
                        updated_at: Set(now),
                        ..Default::default()
                    })
                    .filter(auction_records::Column::Key.eq(key))
                    .filter(auction_records::Column::Version.eq(version as i64))
                    .exec(&self.db)
                    .await
                    .map_err(backend)?;

                Ok(result.rows_affected == 1)
            }
        }
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        AuctionRecordEntity::find()
            .select_only()
            .column(auction_records::Column::Key)
            .filter(auction_records::Column::Key.starts_with(prefix))
            .into_tuple::<String>()
            .all(&self.db)
            .await
            .map_err(backend)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let result = AuctionRecordEntity::delete_many()
            .filter(auction_records::Column::Key.is_in(keys.iter().cloned()))
            .exec(&self.db)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected)
    }
}
