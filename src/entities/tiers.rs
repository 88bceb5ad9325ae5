//! `SeaORM` Entity for tiers table
//!
//! One row per league level (NHL, AHL, ECHL, CHL) per season.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tiers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub season_id: String,
    /// Upper-case league name, e.g. "NHL"
    pub name: String,
    pub league_level: i32,
    pub salary_cap: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
