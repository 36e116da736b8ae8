//! Preconditions shared by the consume and reserve flows.
//!
//! Unlike the validation pipeline, these checks stop at the first failure:
//! the key, then the environment it belongs to, then the service.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        api_key::ApiKey,
        environment::Environment,
        request::NewRequest,
        service::{Service, ServiceStatus},
        validation::{Failure, FailureCode},
    },
    repositories::{ApiKeyRepository, EnvironmentRepository, Repositories, ServiceRepository},
};

/// Everything a call resolved to once all preconditions hold.
#[derive(Debug, Clone)]
pub struct AuthorizedCall {
    pub api_key: ApiKey,
    pub environment: Environment,
    pub service: Service,
}

#[derive(Debug, Clone)]
pub enum Precheck {
    Authorized(AuthorizedCall),
    Rejected(Failure),
}

/// The caller-declared target of a call.
#[derive(Debug, Clone, Copy)]
pub struct CallTarget<'a> {
    pub key_hash: &'a str,
    pub service: &'a str,
    pub version: &'a str,
    pub environment: &'a str,
}

pub struct CallAuthorizer {
    api_keys: Arc<dyn ApiKeyRepository>,
    services: Arc<dyn ServiceRepository>,
    environments: Arc<dyn EnvironmentRepository>,
}

impl CallAuthorizer {
    pub fn new(repositories: &Repositories) -> Self {
        Self {
            api_keys: repositories.api_keys.clone(),
            services: repositories.services.clone(),
            environments: repositories.environments.clone(),
        }
    }

    /// Check key, environment and service, recording each resolved ID on
    /// `draft` as it goes.
    pub async fn authorize(
        &self,
        target: CallTarget<'_>,
        now: DateTime<Utc>,
        draft: &mut NewRequest,
    ) -> Result<Precheck, AppError> {
        let api_key = match self.api_keys.get_by_key(target.key_hash).await {
            Ok(api_key) => api_key,
            Err(err) if err.is_not_found() => return Ok(reject(FailureCode::ApiKeyInvalid)),
            Err(err) => return Err(err),
        };
        draft.api_key_id = Some(api_key.id);

        if !api_key.is_enabled() {
            return Ok(reject(FailureCode::ApiKeyDisabled));
        }
        if api_key.is_expired(now) {
            return Ok(reject(FailureCode::ApiKeyExpired));
        }

        let environment = match self.environments.get_by_id(api_key.environment_id).await {
            Ok(environment) => environment,
            Err(err) if err.is_not_found() => {
                return Ok(reject(FailureCode::EnvironmentMismatch));
            }
            Err(err) => return Err(err),
        };
        if environment.name != target.environment {
            return Ok(reject(FailureCode::EnvironmentMismatch));
        }
        draft.environment_id = Some(environment.id);
        draft.project_id = Some(environment.project_id);

        if !environment.is_enabled() {
            return Ok(reject(FailureCode::EnvironmentDisabled));
        }

        let service = match self
            .services
            .get_by_name_and_version(target.service, target.version)
            .await
        {
            Ok(service) => service,
            Err(err) if err.is_not_found() => return Ok(reject(FailureCode::ServiceMismatch)),
            Err(err) => return Err(err),
        };
        draft.service_id = Some(service.id);

        match service.status {
            ServiceStatus::Enabled => Ok(Precheck::Authorized(AuthorizedCall {
                api_key,
                environment,
                service,
            })),
            ServiceStatus::Disabled => Ok(reject(FailureCode::ServiceDisabled)),
            ServiceStatus::Deprecated => Ok(reject(FailureCode::ServiceDeprecated)),
        }
    }
}

fn reject(code: FailureCode) -> Precheck {
    Precheck::Rejected(Failure::new(code))
}
