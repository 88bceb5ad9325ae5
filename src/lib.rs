// src/lib.rs

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use config::BiddingConfig;
use services::{
    auction_engine::PlayerAuctionEngine,
    auction_store::{AuctionRecords, AuctionStore},
    bidding_admin::BiddingAdmin,
    league_scheduler::LeagueScheduler,
    persistence_gateway::{LeagueRepository, PersistenceGateway},
    reconciliation::ReconciliationService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BiddingConfig>,
    pub repo: Arc<dyn LeagueRepository>,
    pub engine: Arc<PlayerAuctionEngine>,
    pub scheduler: Arc<LeagueScheduler>,
    pub reconciliation: Arc<ReconciliationService>,
    pub admin: Arc<BiddingAdmin>,
}

impl AppState {
    /// Wire every service over the given stores
    pub fn new(config: BiddingConfig, store: Arc<dyn AuctionStore>, repo: Arc<dyn LeagueRepository>) -> Self {
        let records = AuctionRecords::new(store, &config.key_namespace);
        let gateway = Arc::new(PersistenceGateway::new(repo.clone()));
        let engine = Arc::new(PlayerAuctionEngine::new(records, gateway));
        let reconciliation = Arc::new(ReconciliationService::new(engine.clone(), repo.clone()));
        let scheduler = Arc::new(LeagueScheduler::new(
            engine.clone(),
            repo.clone(),
            reconciliation.clone(),
            config.scheduler.clone(),
        ));
        let admin = Arc::new(BiddingAdmin::new(engine.clone(), scheduler.clone(), repo.clone()));

        Self {
            config: Arc::new(config),
            repo,
            engine,
            scheduler,
            reconciliation,
            admin,
        }
    }
}

/// All bidding routes, without transport layers
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/bidding",
            get(handlers::bidding::get_bidding)
                .post(handlers::bidding::place_bid)
                .patch(handlers::bidding::manage_bidding),
        )
        .route("/bidding/scheduler", get(handlers::bidding_scheduler::run_scheduler))
        .route("/bidding/reset", post(handlers::bidding_admin::reset_bidding))
        .route("/bidding/admin/status", get(handlers::bidding_admin::get_status))
        .route(
            "/bidding/admin/discrepancies",
            get(handlers::bidding_admin::get_discrepancies),
        )
        .with_state(state)
}

pub mod entities {
    pub mod prelude;
    pub mod auction_records;
    pub mod bids;
    pub mod contracts;
    pub mod player_seasons;
    pub mod player_team_seasons;
    pub mod players;
    pub mod seasons;
    pub mod team_managers;
    pub mod team_seasons;
    pub mod teams;
    pub mod tiers;
}

pub mod services {
    pub mod auction_store;
    pub mod db_auction_store;
    pub mod persistence_gateway;
    pub mod roster_budget;
    pub mod auction_engine;
    pub mod reconciliation;
    pub mod league_scheduler;
    pub mod bidding_admin;
}

pub mod config;
pub mod error;
pub mod models;
pub mod handlers;
pub mod jobs;
