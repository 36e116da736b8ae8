//! API key validation pipeline.
//!
//! Resolves `(api_key, service, version, environment)` into a verdict
//! without touching quota. The checks run in a fixed order over a shared
//! [`ValidationState`]: the first failure is kept, but later checks keep
//! resolving context so the audit record carries every ID that could be
//! resolved. Only two checks stop the run early:
//!
//! - an API key that does not resolve (nothing to attribute the call to)
//! - an API key used against an environment it does not belong to
//!
//! Both of those overwrite any earlier failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        api_key::{ApiKey, hash_api_key},
        environment::Environment,
        project::ConsumerInfo,
        request::{ExecutionStatus, NewRequest},
        service::{Service, ServiceStatus},
        validation::{Failure, FailureCode, ValidateRequest, ValidationResponse},
    },
    repositories::{
        ApiKeyRepository, EnvironmentRepository, ProjectRepository, Repositories,
        RequestRepository, ServiceRepository,
    },
};

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Service,
    ApiKey,
    Environment,
    Consumer,
    Assignment,
}

/// Execution order. Reordering changes which failure code wins.
const CHECKS: [Check; 5] = [
    Check::Service,
    Check::ApiKey,
    Check::Environment,
    Check::Consumer,
    Check::Assignment,
];

/// Accumulator threaded through every check.
#[derive(Debug, Default)]
pub struct ValidationState {
    pub service: Option<Service>,
    pub api_key: Option<ApiKey>,
    pub environment: Option<Environment>,
    pub consumer: Option<ConsumerInfo>,
    pub failure: Option<FailureCode>,
    halted: bool,
}

impl ValidationState {
    fn set_failure_if_empty(&mut self, code: FailureCode) {
        if self.failure.is_none() {
            self.failure = Some(code);
        }
    }

    fn halt(&mut self, code: FailureCode) {
        self.failure = Some(code);
        self.halted = true;
    }

    /// Copy every resolved reference onto the audit record.
    fn annotate(&self, draft: &mut NewRequest) {
        draft.service_id = self.service.as_ref().map(|s| s.id);
        draft.api_key_id = self.api_key.as_ref().map(|k| k.id);
        draft.environment_id = self.environment.as_ref().map(|e| e.id);
        draft.project_id = self.environment.as_ref().map(|e| e.project_id);
    }
}

/// Result of [`ValidationPipeline::validate_api_key`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub failure: Option<FailureCode>,
    pub consumer: Option<ConsumerInfo>,
}

pub struct ValidationPipeline {
    api_keys: Arc<dyn ApiKeyRepository>,
    services: Arc<dyn ServiceRepository>,
    environments: Arc<dyn EnvironmentRepository>,
    projects: Arc<dyn ProjectRepository>,
    requests: Arc<dyn RequestRepository>,
}

impl ValidationPipeline {
    pub fn new(repositories: &Repositories) -> Self {
        Self {
            api_keys: repositories.api_keys.clone(),
            services: repositories.services.clone(),
            environments: repositories.environments.clone(),
            projects: repositories.projects.clone(),
            requests: repositories.requests.clone(),
        }
    }

    /// Run every check and return the verdict.
    ///
    /// Business-rule failures are part of the verdict. Only infrastructure
    /// errors are returned as `Err`. `draft` is updated with every resolved
    /// reference and with the final status, whatever the outcome.
    pub async fn validate_api_key(
        &self,
        input: &ValidateRequest,
        now: DateTime<Utc>,
        draft: &mut NewRequest,
    ) -> Result<ValidationVerdict, AppError> {
        let mut state = ValidationState::default();

        for check in CHECKS {
            if state.halted {
                break;
            }
            self.run(check, input, now, &mut state).await?;
        }

        state.annotate(draft);
        match state.failure {
            Some(code) => draft.reject(code),
            None => draft.execution_status = ExecutionStatus::Forwarded,
        }

        Ok(ValidationVerdict {
            valid: state.failure.is_none(),
            failure: state.failure,
            consumer: state.consumer,
        })
    }

    /// Validate and persist the audit record for the call.
    pub async fn validate(&self, input: &ValidateRequest) -> Result<ValidationResponse, AppError> {
        let now = Utc::now();
        let mut draft = NewRequest::new(input.request_time.unwrap_or(now), input.metadata.clone());

        let verdict = self.validate_api_key(input, now, &mut draft).await?;
        let request_id = self.requests.create_as_initial_point(&draft).await?;

        let response = match verdict.failure {
            None => ValidationResponse::accepted(request_id),
            Some(code) => {
                tracing::warn!(
                    %request_id,
                    service = %input.service,
                    environment = %input.environment,
                    code = %code,
                    "API key validation rejected"
                );
                ValidationResponse::rejected(request_id, Failure::new(code))
            }
        };

        Ok(response.with_consumer(verdict.consumer))
    }

    async fn run(
        &self,
        check: Check,
        input: &ValidateRequest,
        now: DateTime<Utc>,
        state: &mut ValidationState,
    ) -> Result<(), AppError> {
        match check {
            Check::Service => self.check_service(input, state).await,
            Check::ApiKey => self.check_api_key(input, now, state).await,
            Check::Environment => self.check_environment(input, state).await,
            Check::Consumer => self.resolve_consumer(state).await,
            Check::Assignment => self.check_assignment(state).await,
        }
    }

    async fn check_service(
        &self,
        input: &ValidateRequest,
        state: &mut ValidationState,
    ) -> Result<(), AppError> {
        let service = match self
            .services
            .get_by_name_and_version(&input.service, &input.version)
            .await
        {
            Ok(service) => service,
            Err(err) if err.is_not_found() => {
                state.set_failure_if_empty(FailureCode::ServiceMismatch);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        match service.status {
            ServiceStatus::Enabled => {}
            ServiceStatus::Disabled => state.set_failure_if_empty(FailureCode::ServiceDisabled),
            ServiceStatus::Deprecated => {
                state.set_failure_if_empty(FailureCode::ServiceDeprecated)
            }
        }
        state.service = Some(service);
        Ok(())
    }

    async fn check_api_key(
        &self,
        input: &ValidateRequest,
        now: DateTime<Utc>,
        state: &mut ValidationState,
    ) -> Result<(), AppError> {
        let api_key = match self.api_keys.get_by_key(&hash_api_key(&input.api_key)).await {
            Ok(api_key) => api_key,
            Err(err) if err.is_not_found() => {
                state.halt(FailureCode::ApiKeyInvalid);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if !api_key.is_enabled() {
            state.set_failure_if_empty(FailureCode::ApiKeyDisabled);
        } else if api_key.is_expired(now) {
            state.set_failure_if_empty(FailureCode::ApiKeyExpired);
        }
        state.api_key = Some(api_key);
        Ok(())
    }

    async fn check_environment(
        &self,
        input: &ValidateRequest,
        state: &mut ValidationState,
    ) -> Result<(), AppError> {
        let Some(environment_id) = state.api_key.as_ref().map(|k| k.environment_id) else {
            return Ok(());
        };

        let environment = match self.environments.get_by_id(environment_id).await {
            Ok(environment) => environment,
            Err(err) if err.is_not_found() => {
                state.halt(FailureCode::EnvironmentMismatch);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if environment.name != input.environment {
            state.halt(FailureCode::EnvironmentMismatch);
            return Ok(());
        }
        if !environment.is_enabled() {
            state.set_failure_if_empty(FailureCode::EnvironmentDisabled);
        }
        state.environment = Some(environment);
        Ok(())
    }

    /// Runs regardless of earlier failures: rejected calls still need a
    /// consumer to be billed and audited against.
    async fn resolve_consumer(&self, state: &mut ValidationState) -> Result<(), AppError> {
        let Some(environment) = state.environment.as_ref() else {
            return Ok(());
        };

        match self
            .projects
            .get_project_context_by_id(environment.project_id)
            .await
        {
            Ok(project) => {
                state.consumer = Some(ConsumerInfo::new(
                    project,
                    environment.id,
                    environment.name.clone(),
                ));
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn check_assignment(&self, state: &mut ValidationState) -> Result<(), AppError> {
        if state.failure.is_some() {
            return Ok(());
        }
        let (Some(service), Some(environment)) = (&state.service, &state.environment) else {
            return Ok(());
        };

        if !self
            .environments
            .exists_service_in(environment.id, service.id)
            .await?
        {
            state.set_failure_if_empty(FailureCode::ServiceNotAssigned);
        }
        Ok(())
    }
}
