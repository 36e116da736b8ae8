use std::sync::Arc;

use crate::{
    config::{Config, MAX_RESERVATION_TTL_SECS},
    db::DbPool,
    repositories::Repositories,
    services::{
        allocation::QuotaAllocator, consumption::ConsumptionService,
        reservation::ReservationManager, validation_pipeline::ValidationPipeline,
    },
};

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone: every service sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Kept for the health check.
    pub pool: Option<DbPool>,
    pub pipeline: Arc<ValidationPipeline>,
    pub consumption: Arc<ConsumptionService>,
    pub reservations: Arc<ReservationManager>,
    pub allocator: Arc<QuotaAllocator>,
}

impl AppState {
    /// Services backed by Postgres.
    pub fn new(pool: DbPool, config: &Config) -> Self {
        let mut state = Self::from_repositories(&Repositories::postgres(pool.clone()), config);
        state.pool = Some(pool);
        state
    }

    /// Services over any set of repositories. There is no pool, so the
    /// health check reports the database as not configured.
    pub fn from_repositories(repositories: &Repositories, config: &Config) -> Self {
        let ttl = chrono::Duration::from_std(config.reservation_ttl())
            .unwrap_or_else(|_| chrono::Duration::seconds(MAX_RESERVATION_TTL_SECS as i64));

        Self {
            pool: None,
            pipeline: Arc::new(ValidationPipeline::new(repositories)),
            consumption: Arc::new(ConsumptionService::new(repositories)),
            reservations: Arc::new(ReservationManager::new(repositories, ttl)),
            allocator: Arc::new(QuotaAllocator::new(repositories)),
        }
    }
}
