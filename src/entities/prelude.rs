//! `SeaORM` Entity prelude

pub use super::auction_records::Entity as AuctionRecords;
pub use super::bids::Entity as Bids;
pub use super::contracts::Entity as Contracts;
pub use super::player_seasons::Entity as PlayerSeasons;
pub use super::player_team_seasons::Entity as PlayerTeamSeasons;
pub use super::players::Entity as Players;
pub use super::seasons::Entity as Seasons;
pub use super::team_managers::Entity as TeamManagers;
pub use super::team_seasons::Entity as TeamSeasons;
pub use super::teams::Entity as Teams;
pub use super::tiers::Entity as Tiers;
