//! `SeaORM` Entity for player_team_seasons table (roster assignments)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "player_team_seasons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub player_season_id: String,
    pub team_season_id: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
