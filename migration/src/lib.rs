pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_league_tables;
mod m20261001_000002_create_bids;
mod m20261001_000003_create_auction_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_league_tables::Migration),
            Box::new(m20261001_000002_create_bids::Migration),
            Box::new(m20261001_000003_create_auction_records::Migration),
        ]
    }
}
