//! Immediate consumption: validate a call and debit one request in a
//! single pass.
//!
//! # Process
//!
//! 1. Check key, environment and service (first failure wins)
//! 2. Decrement the grant with one conditional `UPDATE`
//! 3. Diagnose a decrement that matched nothing
//! 4. Record the call, authorized or not

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        api_key::hash_api_key,
        request::{ExecutionStatus, NewRequest},
        validation::{Failure, ValidateRequest, ValidationResponse},
    },
    repositories::{
        ApiKeyRepository, EnvironmentRepository, Repositories, RequestRepository,
        ReservationRepository,
    },
    services::{
        authorization::{CallAuthorizer, CallTarget, Precheck},
        diagnosis::diagnose_missing_quota,
    },
};

pub struct ConsumptionService {
    authorizer: CallAuthorizer,
    api_keys: Arc<dyn ApiKeyRepository>,
    environments: Arc<dyn EnvironmentRepository>,
    requests: Arc<dyn RequestRepository>,
    reservations: Arc<dyn ReservationRepository>,
}

impl ConsumptionService {
    pub fn new(repositories: &Repositories) -> Self {
        Self {
            authorizer: CallAuthorizer::new(repositories),
            api_keys: repositories.api_keys.clone(),
            environments: repositories.environments.clone(),
            requests: repositories.requests.clone(),
            reservations: repositories.reservations.clone(),
        }
    }

    /// Validate the call and consume one request from its quota.
    ///
    /// # Returns
    ///
    /// - `valid: true` with the remaining counter (`-1` when unlimited)
    /// - `valid: false` with a failure code; the rejection is still recorded
    ///
    /// # Errors
    ///
    /// Infrastructure failures only. No audit record is written for them.
    pub async fn validate_and_consume(
        &self,
        input: &ValidateRequest,
    ) -> Result<ValidationResponse, AppError> {
        let now = Utc::now();
        let mut draft = NewRequest::new(input.request_time.unwrap_or(now), input.metadata.clone());
        let key_hash = hash_api_key(&input.api_key);
        let target = CallTarget {
            key_hash: &key_hash,
            service: &input.service,
            version: &input.version,
            environment: &input.environment,
        };

        let call = match self.authorizer.authorize(target, now, &mut draft).await? {
            Precheck::Authorized(call) => call,
            Precheck::Rejected(failure) => return self.reject(draft, failure).await,
        };

        let snapshot = match self
            .environments
            .decrement_available_request(call.environment.id, call.service.id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_not_found() => {
                let failure = diagnose_missing_quota(
                    self.environments.as_ref(),
                    self.reservations.as_ref(),
                    call.environment.id,
                    call.service.id,
                )
                .await?;
                return self.reject(draft, failure).await;
            }
            Err(err) => return Err(err),
        };

        self.api_keys.update_last_used(call.api_key.id, now).await?;

        draft.execution_status = ExecutionStatus::Forwarded;
        let request_id = self.requests.create_as_initial_point(&draft).await?;

        tracing::info!(
            %request_id,
            environment_id = %call.environment.id,
            service_id = %call.service.id,
            available_request = snapshot.available_request.as_wire(),
            "Quota consumed"
        );

        Ok(ValidationResponse::accepted(request_id).with_available(snapshot.available_request))
    }

    async fn reject(
        &self,
        mut draft: NewRequest,
        failure: Failure,
    ) -> Result<ValidationResponse, AppError> {
        draft.reject(failure.code);
        let request_id = self.requests.create_as_initial_point(&draft).await?;

        tracing::warn!(
            %request_id,
            environment_id = ?draft.environment_id,
            service_id = ?draft.service_id,
            code = %failure.code,
            "Consumption rejected"
        );

        Ok(ValidationResponse::rejected(request_id, failure))
    }
}
