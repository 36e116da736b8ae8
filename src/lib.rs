//! Quota gateway control plane.
//!
//! Authorizes API calls made with tenant API keys and meters them against
//! per-environment request quotas, either immediately or through a
//! reserve/commit/rollback protocol.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: API keys stored as SHA-256 digests
//! - **Quota**: single conditional `UPDATE` statements, never read-then-write

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Every route, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/keys/validate", post(handlers::validation::validate_key))
        .route("/api/v1/consume", post(handlers::validation::consume))
        .route("/api/v1/reservations", post(handlers::reservations::reserve))
        .route(
            "/api/v1/reservations/{id}/validate",
            post(handlers::reservations::validate_reservation),
        )
        .route(
            "/api/v1/reservations/{id}/commit",
            post(handlers::reservations::commit),
        )
        .route(
            "/api/v1/reservations/{id}/rollback",
            post(handlers::reservations::rollback),
        )
        .route(
            "/api/v1/environments/{environment_id}/services/{service_id}/quota",
            put(handlers::allocations::allocate_quota),
        )
        .with_state(state)
}
