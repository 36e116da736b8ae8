//! Repository ports consumed by the service layer.
//!
//! Each trait is kept narrow so the services can be driven by substitutable
//! implementations: the Postgres adapters in [`postgres`] at runtime, and
//! in-memory fakes in tests. Lookups report a missing row as
//! `AppError::NotFound`; the services decide whether that is a business
//! failure or an infrastructure one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        api_key::ApiKey,
        environment::{Environment, EnvironmentService, QuotaDiagnosis},
        project::{ProjectContext, QuotaUsage},
        quota::{Quota, QuotaSnapshot},
        request::NewRequest,
        reservation::{Reservation, ReservationDetails},
        service::Service,
    },
};

pub mod postgres;

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Look up a key by the SHA-256 hash of its secret.
    async fn get_by_key(&self, key_hash: &str) -> Result<ApiKey, AppError>;

    async fn update_last_used(&self, api_key_id: Uuid, at: DateTime<Utc>)
    -> Result<(), AppError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn get_by_name_and_version(&self, name: &str, version: &str)
    -> Result<Service, AppError>;
}

/// Environment lookups plus the quota primitives.
///
/// The decrement and increment must each be a single conditional statement;
/// concurrent callers are serialized by the store, never by this crate.
#[async_trait]
pub trait EnvironmentRepository: Send + Sync {
    async fn get_by_id(&self, environment_id: Uuid) -> Result<Environment, AppError>;

    async fn exists_service_in(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<bool, AppError>;

    /// Explain why a decrement matched no row.
    async fn missing_resource_diagnosis(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<QuotaDiagnosis, AppError>;

    /// Take one request from the grant.
    ///
    /// Unlimited grants are matched but left untouched. Returns `NotFound`
    /// both when the grant is missing and when it is exhausted.
    async fn decrement_available_request(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<QuotaSnapshot, AppError>;

    /// Give one request back. Never exceeds the ceiling and never touches
    /// unlimited grants.
    async fn increase_available_request(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get_project_context_by_id(&self, project_id: Uuid)
    -> Result<ProjectContext, AppError>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Persist a record whose `start_point` was set by the caller.
    async fn create(&self, record: &NewRequest) -> Result<Uuid, AppError>;

    /// Persist a record that starts its own chain (`start_point = id`).
    async fn create_as_initial_point(&self, record: &NewRequest) -> Result<Uuid, AppError>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn create(&self, reservation: &Reservation) -> Result<(), AppError>;

    async fn get_by_id(&self, reservation_id: Uuid) -> Result<Reservation, AppError>;

    async fn get_by_id_with_details(
        &self,
        reservation_id: Uuid,
    ) -> Result<ReservationDetails, AppError>;

    async fn count_by_environment_and_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<u64, AppError>;

    /// Remove a reservation. `NotFound` when no row was deleted, so only one
    /// of several racing callers ever succeeds.
    async fn delete(&self, reservation_id: Uuid) -> Result<(), AppError>;

    /// Reservations whose `expires_at` is at or before `now`, oldest first.
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Reservation>, AppError>;
}

/// Expected state of a grant for an optimistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantVersion {
    pub max_request: Quota,
    pub available_request: Quota,
}

/// Reads and writes used when handing quota to an environment.
#[async_trait]
pub trait QuotaAllocationRepository: Send + Sync {
    /// Project ceiling for the environment's project and the sum of its
    /// sibling environments' ceilings (the environment itself excluded).
    /// `None` when the project has no grant for the service.
    async fn get_project_service_quota_usage(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<QuotaUsage>, AppError>;

    async fn get_environment_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<EnvironmentService>, AppError>;

    /// Create (`expected = None`) or update the grant.
    ///
    /// Writes under one project grant are serialized, and the project
    /// ceiling is checked again against the siblings before writing; a
    /// ceiling that no longer fits is a `Validation` error. Returns `None`
    /// when the stored grant no longer matches `expected`, i.e. another
    /// writer got there first.
    async fn save_environment_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
        expected: Option<GrantVersion>,
        max_request: Quota,
        available_request: Quota,
    ) -> Result<Option<EnvironmentService>, AppError>;
}

/// One handle per port, shared by every service.
///
/// Services pick the ports they need out of this bundle at construction.
#[derive(Clone)]
pub struct Repositories {
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub environments: Arc<dyn EnvironmentRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub requests: Arc<dyn RequestRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub allocations: Arc<dyn QuotaAllocationRepository>,
}

impl Repositories {
    /// Postgres adapters over a shared pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            api_keys: Arc::new(postgres::PgApiKeyRepository::new(pool.clone())),
            services: Arc::new(postgres::PgServiceRepository::new(pool.clone())),
            environments: Arc::new(postgres::PgEnvironmentRepository::new(pool.clone())),
            projects: Arc::new(postgres::PgProjectRepository::new(pool.clone())),
            requests: Arc::new(postgres::PgRequestRepository::new(pool.clone())),
            reservations: Arc::new(postgres::PgReservationRepository::new(pool.clone())),
            allocations: Arc::new(postgres::PgQuotaAllocationRepository::new(pool)),
        }
    }
}
