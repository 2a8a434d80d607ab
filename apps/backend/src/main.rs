mod config;
mod db;
mod error;
mod llm;
mod models;
mod routes;
mod services;

use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use routes::CardLocks;
use services::recommendation::RecommendationService;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub recommender: RecommendationService,
    pub locks: CardLocks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database setup
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    db::migrate(&pool).await?;

    // Ranking chain + recommendation pipeline
    let recommender = RecommendationService::new(&config);
    if config.llm.enabled {
        tracing::info!(
            "LLM ranking chain {:?} enabled with {} node(s)",
            config.llm.chain_id,
            config.llm.nodes.len()
        );
    } else {
        tracing::warn!("LLM ranking disabled - recommendations fall back to FSRS ordering");
    }

    let bind_addr = config.server.bind_addr();
    let state = Arc::new(AppState {
        db: pool,
        config,
        recommender,
        locks: CardLocks::new(),
    });

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
