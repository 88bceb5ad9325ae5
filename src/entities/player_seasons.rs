//! `SeaORM` Entity for player_seasons table
//!
//! `is_in_bidding` is the "eligible for bidding" flag the auction engine
//! clears on finalization.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "player_seasons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub player_id: String,
    pub season_id: String,
    pub contract_id: String,
    /// C, LW, RW, LD, RD or G
    pub position: String,
    pub is_in_bidding: bool,
    pub games_played: i32,
    pub goals: i32,
    pub assists: i32,
    pub plus_minus: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
