//! In-memory implementation of every repository port.
//!
//! One mutex guards the whole store, so each port call is atomic the way a
//! single conditional SQL statement is.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use quota_gateway::{
    config::Config,
    error::AppError,
    models::{
        api_key::{ApiKey, ApiKeyStatus, hash_api_key},
        environment::{Environment, EnvironmentService, EnvironmentStatus, QuotaDiagnosis},
        project::{ProjectContext, QuotaUsage},
        quota::{Quota, QuotaSnapshot},
        request::{NewRequest, RequestMetadata},
        reservation::{Reservation, ReservationDetails},
        service::{Service, ServiceStatus},
        validation::{ReservationValidateRequest, ValidateRequest},
    },
    repositories::{
        ApiKeyRepository, EnvironmentRepository, GrantVersion, ProjectRepository,
        QuotaAllocationRepository, Repositories, RequestRepository, ReservationRepository,
        ServiceRepository,
    },
};

pub const API_KEY: &str = "sk_test_4f8a2c";
pub const SERVICE: &str = "billing";
pub const VERSION: &str = "v1";
pub const ENVIRONMENT: &str = "production";

#[derive(Default)]
struct Inner {
    api_keys: HashMap<Uuid, ApiKey>,
    services: HashMap<Uuid, Service>,
    environments: HashMap<Uuid, Environment>,
    projects: HashMap<Uuid, ProjectContext>,
    project_grants: HashMap<(Uuid, Uuid), Quota>,
    grants: HashMap<(Uuid, Uuid), EnvironmentService>,
    requests: Vec<NewRequest>,
    reservations: HashMap<Uuid, Reservation>,
}

impl Inner {
    fn quota_usage(&self, environment_id: Uuid, service_id: Uuid) -> Option<QuotaUsage> {
        let project_id = self.environments.get(&environment_id)?.project_id;
        let max_allowed = *self.project_grants.get(&(project_id, service_id))?;

        let siblings = self.grants.values().filter(|grant| {
            grant.service_id == service_id
                && grant.environment_id != environment_id
                && self
                    .environments
                    .get(&grant.environment_id)
                    .is_some_and(|e| e.project_id == project_id)
        });

        let mut usage = QuotaUsage {
            max_allowed,
            current_allocated: 0,
            has_unlimited_sibling: false,
        };
        for grant in siblings {
            match grant.max_request {
                Quota::Unlimited => usage.has_unlimited_sibling = true,
                Quota::Bounded(n) => usage.current_allocated += u64::from(n),
            }
        }
        Some(usage)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Number of upcoming grant saves that lose their optimistic race.
    save_conflicts: AtomicUsize,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            api_keys: self.clone(),
            services: self.clone(),
            environments: self.clone(),
            projects: self.clone(),
            requests: self.clone(),
            reservations: self.clone(),
            allocations: self.clone(),
        }
    }

    pub fn add_project(&self, name: &str) -> Uuid {
        let project_id = Uuid::new_v4();
        self.lock().projects.insert(
            project_id,
            ProjectContext {
                client_id: Uuid::new_v4(),
                client_name: "Acme".into(),
                project_id,
                project_name: name.into(),
            },
        );
        project_id
    }

    pub fn remove_project(&self, project_id: Uuid) {
        self.lock().projects.remove(&project_id);
    }

    pub fn add_environment(&self, project_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().environments.insert(
            id,
            Environment {
                id,
                name: name.into(),
                status: EnvironmentStatus::Enabled,
                project_id,
            },
        );
        id
    }

    pub fn add_service(&self, name: &str, version: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().services.insert(
            id,
            Service {
                id,
                name: name.into(),
                version: version.into(),
                status: ServiceStatus::Enabled,
            },
        );
        id
    }

    pub fn add_api_key(&self, key: &str, environment_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().api_keys.insert(
            id,
            ApiKey {
                id,
                key_hash: hash_api_key(key),
                status: ApiKeyStatus::Enabled,
                expires_at: None,
                last_used: None,
                environment_id,
            },
        );
        id
    }

    pub fn grant_project(&self, project_id: Uuid, service_id: Uuid, max_request: Quota) {
        self.lock()
            .project_grants
            .insert((project_id, service_id), max_request);
    }

    /// Grant with a full counter.
    pub fn grant(&self, environment_id: Uuid, service_id: Uuid, max_request: Quota) {
        self.set_grant(environment_id, service_id, max_request, max_request);
    }

    pub fn set_grant(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
        max_request: Quota,
        available_request: Quota,
    ) {
        self.lock().grants.insert(
            (environment_id, service_id),
            EnvironmentService {
                environment_id,
                service_id,
                max_request,
                available_request,
                assigned_at: Utc::now(),
            },
        );
    }

    pub fn grant_of(&self, environment_id: Uuid, service_id: Uuid) -> Option<EnvironmentService> {
        self.lock().grants.get(&(environment_id, service_id)).cloned()
    }

    pub fn available(&self, environment_id: Uuid, service_id: Uuid) -> Quota {
        self.grant_of(environment_id, service_id)
            .map(|grant| grant.available_request)
            .expect("grant exists")
    }

    pub fn set_api_key_status(&self, api_key_id: Uuid, status: ApiKeyStatus) {
        self.lock().api_keys.get_mut(&api_key_id).unwrap().status = status;
    }

    pub fn set_api_key_expiry(&self, api_key_id: Uuid, expires_at: Option<DateTime<Utc>>) {
        self.lock().api_keys.get_mut(&api_key_id).unwrap().expires_at = expires_at;
    }

    pub fn api_key(&self, api_key_id: Uuid) -> ApiKey {
        self.lock().api_keys[&api_key_id].clone()
    }

    pub fn set_service_status(&self, service_id: Uuid, status: ServiceStatus) {
        self.lock().services.get_mut(&service_id).unwrap().status = status;
    }

    pub fn set_environment_status(&self, environment_id: Uuid, status: EnvironmentStatus) {
        self.lock()
            .environments
            .get_mut(&environment_id)
            .unwrap()
            .status = status;
    }

    pub fn requests(&self) -> Vec<NewRequest> {
        self.lock().requests.clone()
    }

    pub fn request(&self, request_id: Uuid) -> NewRequest {
        self.lock()
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
            .expect("request recorded")
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.lock().reservations.values().cloned().collect()
    }

    pub fn set_reservation_expiry(&self, reservation_id: Uuid, expires_at: DateTime<Utc>) {
        self.lock()
            .reservations
            .get_mut(&reservation_id)
            .unwrap()
            .expires_at = expires_at;
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.save_conflicts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApiKeyRepository for MemoryStore {
    async fn get_by_key(&self, key_hash: &str) -> Result<ApiKey, AppError> {
        self.lock()
            .api_keys
            .values()
            .find(|k| k.key_hash == key_hash)
            .cloned()
            .ok_or(AppError::NotFound("API key"))
    }

    async fn update_last_used(
        &self,
        api_key_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        let key = inner
            .api_keys
            .get_mut(&api_key_id)
            .ok_or(AppError::NotFound("API key"))?;
        key.last_used = Some(at);
        Ok(())
    }
}

#[async_trait]
impl ServiceRepository for MemoryStore {
    async fn get_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Service, AppError> {
        self.lock()
            .services
            .values()
            .find(|s| s.name == name && s.version == version)
            .cloned()
            .ok_or(AppError::NotFound("Service"))
    }
}

#[async_trait]
impl EnvironmentRepository for MemoryStore {
    async fn get_by_id(&self, environment_id: Uuid) -> Result<Environment, AppError> {
        self.lock()
            .environments
            .get(&environment_id)
            .cloned()
            .ok_or(AppError::NotFound("Environment"))
    }

    async fn exists_service_in(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<bool, AppError> {
        Ok(self.lock().grants.contains_key(&(environment_id, service_id)))
    }

    async fn missing_resource_diagnosis(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<QuotaDiagnosis, AppError> {
        Ok(match self.lock().grants.get(&(environment_id, service_id)) {
            None => QuotaDiagnosis {
                grant_exists: false,
                has_available_capacity: false,
            },
            Some(grant) => QuotaDiagnosis {
                grant_exists: true,
                has_available_capacity: grant.available_request.has_capacity(),
            },
        })
    }

    async fn decrement_available_request(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<QuotaSnapshot, AppError> {
        let mut inner = self.lock();
        let grant = inner
            .grants
            .get_mut(&(environment_id, service_id))
            .ok_or(AppError::NotFound("Environment service quota"))?;

        grant.available_request = match grant.available_request {
            Quota::Unlimited => Quota::Unlimited,
            Quota::Bounded(n) if n > 0 => Quota::Bounded(n - 1),
            Quota::Bounded(_) => return Err(AppError::NotFound("Environment service quota")),
        };

        Ok(QuotaSnapshot {
            max_request: grant.max_request,
            available_request: grant.available_request,
        })
    }

    async fn increase_available_request(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if let Some(grant) = inner.grants.get_mut(&(environment_id, service_id)) {
            if let (Quota::Bounded(available), Quota::Bounded(max)) =
                (grant.available_request, grant.max_request)
            {
                if available < max {
                    grant.available_request = Quota::Bounded(available + 1);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for MemoryStore {
    async fn get_project_context_by_id(
        &self,
        project_id: Uuid,
    ) -> Result<ProjectContext, AppError> {
        self.lock()
            .projects
            .get(&project_id)
            .cloned()
            .ok_or(AppError::NotFound("Project"))
    }
}

#[async_trait]
impl RequestRepository for MemoryStore {
    async fn create(&self, record: &NewRequest) -> Result<Uuid, AppError> {
        if record.start_point.is_none() {
            return Err(AppError::Internal("request record without start point".into()));
        }
        self.lock().requests.push(record.clone());
        Ok(record.id)
    }

    async fn create_as_initial_point(&self, record: &NewRequest) -> Result<Uuid, AppError> {
        let record = record.clone().chained_to(record.id);
        self.lock().requests.push(record.clone());
        Ok(record.id)
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn create(&self, reservation: &Reservation) -> Result<(), AppError> {
        let mut inner = self.lock();
        // Mirrors the foreign key on start_request_id.
        if !inner
            .requests
            .iter()
            .any(|r| r.id == reservation.start_request_id)
        {
            return Err(AppError::Internal("start request does not exist".into()));
        }
        inner.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_by_id(&self, reservation_id: Uuid) -> Result<Reservation, AppError> {
        self.lock()
            .reservations
            .get(&reservation_id)
            .cloned()
            .ok_or(AppError::NotFound("Reservation"))
    }

    async fn get_by_id_with_details(
        &self,
        reservation_id: Uuid,
    ) -> Result<ReservationDetails, AppError> {
        let inner = self.lock();
        let reservation = inner
            .reservations
            .get(&reservation_id)
            .cloned()
            .ok_or(AppError::NotFound("Reservation"))?;
        let service = &inner.services[&reservation.service_id];
        let environment = &inner.environments[&reservation.environment_id];

        Ok(ReservationDetails {
            service_name: service.name.clone(),
            service_version: service.version.clone(),
            service_status: service.status,
            environment_name: environment.name.clone(),
            environment_status: environment.status,
            project_id: environment.project_id,
            reservation,
        })
    }

    async fn count_by_environment_and_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<u64, AppError> {
        Ok(self
            .lock()
            .reservations
            .values()
            .filter(|r| r.environment_id == environment_id && r.service_id == service_id)
            .count() as u64)
    }

    async fn delete(&self, reservation_id: Uuid) -> Result<(), AppError> {
        self.lock()
            .reservations
            .remove(&reservation_id)
            .map(|_| ())
            .ok_or(AppError::NotFound("Reservation"))
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Reservation>, AppError> {
        let mut expired: Vec<_> = self
            .lock()
            .reservations
            .values()
            .filter(|r| r.expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }
}

#[async_trait]
impl QuotaAllocationRepository for MemoryStore {
    async fn get_project_service_quota_usage(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<QuotaUsage>, AppError> {
        Ok(self.lock().quota_usage(environment_id, service_id))
    }

    async fn get_environment_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<EnvironmentService>, AppError> {
        Ok(self.grant_of(environment_id, service_id))
    }

    async fn save_environment_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
        expected: Option<GrantVersion>,
        max_request: Quota,
        available_request: Quota,
    ) -> Result<Option<EnvironmentService>, AppError> {
        let pending = self.save_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.save_conflicts.store(pending - 1, Ordering::SeqCst);
            return Ok(None);
        }

        let mut inner = self.lock();
        inner
            .quota_usage(environment_id, service_id)
            .ok_or_else(|| AppError::Validation("service not assigned to project".into()))?
            .admit(max_request)?;

        let current = inner.grants.get(&(environment_id, service_id)).map(|g| GrantVersion {
            max_request: g.max_request,
            available_request: g.available_request,
        });
        if current != expected {
            return Ok(None);
        }

        let assigned_at = inner
            .grants
            .get(&(environment_id, service_id))
            .map_or_else(Utc::now, |g| g.assigned_at);
        let grant = EnvironmentService {
            environment_id,
            service_id,
            max_request,
            available_request,
            assigned_at,
        };
        inner.grants.insert((environment_id, service_id), grant.clone());
        Ok(Some(grant))
    }
}

/// One client, project, environment, service and key, wired together.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub repositories: Repositories,
    pub project_id: Uuid,
    pub environment_id: Uuid,
    pub service_id: Uuid,
    pub api_key_id: Uuid,
}

impl Fixture {
    /// Everything enabled, with the service granted to the environment.
    pub fn with_quota(max_request: Quota) -> Self {
        let fixture = Self::without_grant();
        fixture
            .store
            .grant(fixture.environment_id, fixture.service_id, max_request);
        fixture
    }

    /// Everything enabled, but the service is not granted to the
    /// environment.
    pub fn without_grant() -> Self {
        let store = Arc::new(MemoryStore::default());
        let project_id = store.add_project("Storefront");
        let environment_id = store.add_environment(project_id, ENVIRONMENT);
        let service_id = store.add_service(SERVICE, VERSION);
        let api_key_id = store.add_api_key(API_KEY, environment_id);
        store.grant_project(project_id, service_id, Quota::Unlimited);

        Self {
            repositories: store.repositories(),
            store,
            project_id,
            environment_id,
            service_id,
            api_key_id,
        }
    }

    pub fn request(&self) -> ValidateRequest {
        validate_request(API_KEY, SERVICE, VERSION, ENVIRONMENT)
    }

    pub fn reservation_request(&self) -> ReservationValidateRequest {
        reservation_request(API_KEY, SERVICE, VERSION, ENVIRONMENT)
    }
}

pub fn validate_request(
    api_key: &str,
    service: &str,
    version: &str,
    environment: &str,
) -> ValidateRequest {
    ValidateRequest {
        api_key: api_key.into(),
        service: service.into(),
        version: version.into(),
        environment: environment.into(),
        request_time: None,
        metadata: RequestMetadata {
            path: Some("/invoices".into()),
            method: Some("GET".into()),
            ..RequestMetadata::default()
        },
    }
}

pub fn reservation_request(
    api_key: &str,
    service: &str,
    version: &str,
    environment: &str,
) -> ReservationValidateRequest {
    ReservationValidateRequest {
        api_key: api_key.into(),
        service: service.into(),
        version: version.into(),
        environment: environment.into(),
        request_time: None,
        metadata: RequestMetadata::default(),
    }
}

/// Configuration with defaults and a five minute reservation lifetime.
pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/quota_gateway_test".into(),
        server_port: 0,
        database_max_connections: 1,
        reservation_ttl_secs: 300,
        reservation_sweep_interval_secs: None,
        reservation_sweep_batch_size: 100,
    }
}

pub fn reservation_ttl() -> Duration {
    Duration::minutes(5)
}

/// The full router over the fixture's in-memory repositories.
pub fn build_test_app(fixture: &Fixture) -> axum::Router {
    let state = quota_gateway::state::AppState::from_repositories(
        &fixture.repositories,
        &test_config(),
    );
    quota_gateway::router(state)
}

pub async fn send_json(
    app: axum::Router,
    method: axum::http::Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> axum::response::Response {
    use tower::ServiceExt;

    let builder = axum::http::Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    use http_body_util::BodyExt;

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
