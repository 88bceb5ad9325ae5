use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bidding_backend::config::{BiddingConfig, StoreBackend};
use bidding_backend::jobs::bidding_sweep_job::start_bidding_sweep_job;
use bidding_backend::services::auction_store::{AuctionStore, MemoryAuctionStore};
use bidding_backend::services::db_auction_store::DbAuctionStore;
use bidding_backend::services::persistence_gateway::SeaOrmLeagueRepository;
use bidding_backend::{build_router, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bidding_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = BiddingConfig::from_env().expect("Invalid bidding configuration");
    if config.admin_api_key.is_none() {
        tracing::warn!("ADMIN_API_KEY not set, admin endpoints will refuse requests");
    }
    if config.scheduler_api_key.is_none() {
        tracing::warn!("SCHEDULER_API_KEY not set, external scheduler trigger is disabled");
    }

    // Connect to database
    let database_url = config.database_url.clone().expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn AuctionStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory auction store, auction state is lost on restart");
            Arc::new(MemoryAuctionStore::new())
        }
        StoreBackend::Database => Arc::new(DbAuctionStore::new(db.clone())),
    };
    let repo = Arc::new(SeaOrmLeagueRepository::new(db));

    let bind_addr = config.bind_addr.clone();
    let sweep_interval_secs = config.sweep_interval_secs;
    let state = AppState::new(config, store, repo);

    start_bidding_sweep_job(state.scheduler.clone(), sweep_interval_secs).await;

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
