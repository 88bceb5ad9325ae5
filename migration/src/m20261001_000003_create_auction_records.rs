//! Key-value table backing the durable auction store. `version` is bumped on
//! every write and drives compare-and-set updates.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuctionRecords::Table)
                    .if_not_exists()
                    .col(string(AuctionRecords::Key).primary_key())
                    .col(json_binary(AuctionRecords::Value))
                    .col(big_integer(AuctionRecords::Version).default(1))
                    .col(timestamp_with_time_zone(AuctionRecords::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuctionRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AuctionRecords {
    Table,
    Key,
    Value,
    Version,
    UpdatedAt,
}
