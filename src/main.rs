mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;
mod store;

use anyhow::Result;
use std::sync::Arc;

use services::{plan_lock, RecommendationClient, Services};
use store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting wedding planner backend"
    );

    // Create database pool
    let pool = db::create_pool(&settings).await?;
    let store = Arc::new(PgStore::new(pool.clone()));

    // Generative model client; starts degraded without credentials
    let client = RecommendationClient::from_settings(&settings.llm, store.clone())?;

    // Per-plan mutation lock
    let lock = plan_lock::from_settings(&settings).await?;
    tracing::info!(backend = lock.backend(), "Plan lock initialized");

    let services = Services::new(store.clone(), store.clone(), store, client, lock);

    // Create application state
    let state = app::AppState::new(pool, settings.clone(), services);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
