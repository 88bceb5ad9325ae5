//! Append-only bid ledger (audit trail, never read back by the engine)

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bids::Table)
                    .if_not_exists()
                    .col(pk_auto(Bids::Id))
                    .col(string(Bids::ContractId))
                    .col(string(Bids::TeamSeasonId))
                    .col(big_integer(Bids::Amount))
                    .col(timestamp_with_time_zone(Bids::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        // Reset deletes a tier's ledger by team season
        manager
            .create_index(
                Index::create()
                    .name("idx_bids_team_season")
                    .table(Bids::Table)
                    .col(Bids::TeamSeasonId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bids::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Bids {
    Table,
    Id,
    ContractId,
    TeamSeasonId,
    Amount,
    CreatedAt,
}
