//! Quota gateway - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Start the expired reservation sweeper, if configured
//! 5. Build HTTP router and start server on configured port

use quota_gateway::{config, db, services::reaper, state::AppState};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG, defaulting to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = AppState::new(pool, &config);

    match config.sweep_interval() {
        Some(every) => {
            reaper::spawn_reservation_sweeper(
                state.reservations.clone(),
                every,
                config.reservation_sweep_batch_size,
            );
            tracing::info!(interval_secs = every.as_secs(), "Reservation sweeper started");
        }
        None => tracing::info!("Reservation sweeper disabled"),
    }

    let app = quota_gateway::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
