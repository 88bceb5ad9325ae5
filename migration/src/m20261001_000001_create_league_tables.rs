//! League tables the bidding engine reads and writes: seasons, tiers, teams,
//! managers, players, contracts and roster assignments

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Seasons::Table)
                    .if_not_exists()
                    .col(string(Seasons::Id).primary_key())
                    .col(string(Seasons::Name))
                    .col(boolean(Seasons::IsLatest).default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tiers::Table)
                    .if_not_exists()
                    .col(string(Tiers::Id).primary_key())
                    .col(string(Tiers::SeasonId))
                    .col(string(Tiers::Name))
                    .col(integer(Tiers::LeagueLevel))
                    .col(big_integer(Tiers::SalaryCap))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tiers_season")
                            .from(Tiers::Table, Tiers::SeasonId)
                            .to(Seasons::Table, Seasons::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Tier lookup is always by (season, league name)
        manager
            .create_index(
                Index::create()
                    .name("idx_tiers_season_name")
                    .table(Tiers::Table)
                    .col(Tiers::SeasonId)
                    .col(Tiers::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Teams::Table)
                    .if_not_exists()
                    .col(string(Teams::Id).primary_key())
                    .col(string(Teams::OfficialName))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TeamSeasons::Table)
                    .if_not_exists()
                    .col(string(TeamSeasons::Id).primary_key())
                    .col(string(TeamSeasons::TeamId))
                    .col(string(TeamSeasons::TierId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_seasons_team")
                            .from(TeamSeasons::Table, TeamSeasons::TeamId)
                            .to(Teams::Table, Teams::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_seasons_tier")
                            .from(TeamSeasons::Table, TeamSeasons::TierId)
                            .to(Tiers::Table, Tiers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_team_seasons_team_tier")
                    .table(TeamSeasons::Table)
                    .col(TeamSeasons::TeamId)
                    .col(TeamSeasons::TierId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TeamManagers::Table)
                    .if_not_exists()
                    .col(string(TeamManagers::Id).primary_key())
                    .col(string(TeamManagers::UserId))
                    .col(string(TeamManagers::TeamId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_team_managers_team")
                            .from(TeamManagers::Table, TeamManagers::TeamId)
                            .to(Teams::Table, Teams::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_team_managers_user_team")
                    .table(TeamManagers::Table)
                    .col(TeamManagers::UserId)
                    .col(TeamManagers::TeamId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Players::Table)
                    .if_not_exists()
                    .col(string(Players::Id).primary_key())
                    .col(string(Players::Name))
                    .col(string_null(Players::Gamertag))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Contracts::Table)
                    .if_not_exists()
                    .col(string(Contracts::Id).primary_key())
                    .col(big_integer(Contracts::Amount))
                    .col(timestamp_with_time_zone(Contracts::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlayerSeasons::Table)
                    .if_not_exists()
                    .col(string(PlayerSeasons::Id).primary_key())
                    .col(string(PlayerSeasons::PlayerId))
                    .col(string(PlayerSeasons::SeasonId))
                    .col(string(PlayerSeasons::ContractId))
                    .col(string(PlayerSeasons::Position))
                    .col(boolean(PlayerSeasons::IsInBidding).default(false))
                    .col(integer(PlayerSeasons::GamesPlayed).default(0))
                    .col(integer(PlayerSeasons::Goals).default(0))
                    .col(integer(PlayerSeasons::Assists).default(0))
                    .col(integer(PlayerSeasons::PlusMinus).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_player_seasons_player")
                            .from(PlayerSeasons::Table, PlayerSeasons::PlayerId)
                            .to(Players::Table, Players::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_player_seasons_season")
                            .from(PlayerSeasons::Table, PlayerSeasons::SeasonId)
                            .to(Seasons::Table, Seasons::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_player_seasons_contract")
                            .from(PlayerSeasons::Table, PlayerSeasons::ContractId)
                            .to(Contracts::Table, Contracts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Eligible-player scans filter on (season, flag)
        manager
            .create_index(
                Index::create()
                    .name("idx_player_seasons_season_bidding")
                    .table(PlayerSeasons::Table)
                    .col(PlayerSeasons::SeasonId)
                    .col(PlayerSeasons::IsInBidding)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlayerTeamSeasons::Table)
                    .if_not_exists()
                    .col(pk_auto(PlayerTeamSeasons::Id))
                    .col(string(PlayerTeamSeasons::PlayerSeasonId))
                    .col(string(PlayerTeamSeasons::TeamSeasonId))
                    .col(timestamp_with_time_zone(PlayerTeamSeasons::CreatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_player_team_seasons_player_season")
                            .from(PlayerTeamSeasons::Table, PlayerTeamSeasons::PlayerSeasonId)
                            .to(PlayerSeasons::Table, PlayerSeasons::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_player_team_seasons_team_season")
                            .from(PlayerTeamSeasons::Table, PlayerTeamSeasons::TeamSeasonId)
                            .to(TeamSeasons::Table, TeamSeasons::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // A settlement replay must not create a second roster row
        manager
            .create_index(
                Index::create()
                    .name("idx_player_team_seasons_unique")
                    .table(PlayerTeamSeasons::Table)
                    .col(PlayerTeamSeasons::PlayerSeasonId)
                    .col(PlayerTeamSeasons::TeamSeasonId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlayerTeamSeasons::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PlayerSeasons::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contracts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Players::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TeamManagers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TeamSeasons::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Teams::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tiers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Seasons::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Seasons {
    Table,
    Id,
    Name,
    IsLatest,
}

#[derive(DeriveIden)]
enum Tiers {
    Table,
    Id,
    SeasonId,
    Name,
    LeagueLevel,
    SalaryCap,
}

#[derive(DeriveIden)]
enum Teams {
    Table,
    Id,
    OfficialName,
}

#[derive(DeriveIden)]
enum TeamSeasons {
    Table,
    Id,
    TeamId,
    TierId,
}

#[derive(DeriveIden)]
enum TeamManagers {
    Table,
    Id,
    UserId,
    TeamId,
}

#[derive(DeriveIden)]
enum Players {
    Table,
    Id,
    Name,
    Gamertag,
}

#[derive(DeriveIden)]
enum Contracts {
    Table,
    Id,
    Amount,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PlayerSeasons {
    Table,
    Id,
    PlayerId,
    SeasonId,
    ContractId,
    Position,
    IsInBidding,
    GamesPlayed,
    Goals,
    Assists,
    PlusMinus,
}

#[derive(DeriveIden)]
enum PlayerTeamSeasons {
    Table,
    Id,
    PlayerSeasonId,
    TeamSeasonId,
    CreatedAt,
}
