//! Two-phase consumption: reserve, then commit or roll back.
//!
//! A reservation debits quota up front, before the caller knows whether
//! its downstream work will succeed.
//!
//! ```text
//! Reserved --commit--> (row deleted, quota stays debited)
//!          \-rollback-> (row deleted, one request returned)
//! ```
//!
//! Deletion is the arbiter: whichever of commit, rollback or the expiry
//! sweep deletes the row owns the outcome, and quota is only returned by a
//! caller whose delete succeeded.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        api_key::hash_api_key,
        environment::EnvironmentStatus,
        request::{ExecutionStatus, NewRequest},
        reservation::{Reservation, ReservationDetails},
        service::ServiceStatus,
        validation::{
            Failure, FailureCode, ReservationValidateRequest, ValidateRequest, ValidationResponse,
        },
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

pub struct ReservationManager {
    authorizer: CallAuthorizer,
    api_keys: Arc<dyn ApiKeyRepository>,
    environments: Arc<dyn EnvironmentRepository>,
    requests: Arc<dyn RequestRepository>,
    reservations: Arc<dyn ReservationRepository>,
    ttl: Duration,
}

impl ReservationManager {
    pub fn new(repositories: &Repositories, ttl: Duration) -> Self {
        Self {
            authorizer: CallAuthorizer::new(repositories),
            api_keys: repositories.api_keys.clone(),
            environments: repositories.environments.clone(),
            requests: repositories.requests.clone(),
            reservations: repositories.reservations.clone(),
            ttl,
        }
    }

    /// Validate the call and hold one request of quota for it.
    ///
    /// Same preconditions as immediate consumption. On success the response
    /// carries the `reservation_id` to commit or roll back, and the
    /// `request_id` that later records chain onto.
    pub async fn validate_and_reserve(
        &self,
        input: &ValidateRequest,
    ) -> Result<ValidationResponse, AppError> {
        let now = Utc::now();
        let request_time = input.request_time.unwrap_or(now);
        let mut draft = NewRequest::new(request_time, input.metadata.clone());
        let key_hash = hash_api_key(&input.api_key);
        let target = CallTarget {
            key_hash: &key_hash,
            service: &input.service,
            version: &input.version,
            environment: &input.environment,
        };

        let call = match self.authorizer.authorize(target, now, &mut draft).await? {
            Precheck::Authorized(call) => call,
            Precheck::Rejected(failure) => return self.reject_initial(draft, failure).await,
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
                return self.reject_initial(draft, failure).await;
            }
            Err(err) => return Err(err),
        };

        self.api_keys.update_last_used(call.api_key.id, now).await?;

        // The reservation references the record, so it is written first.
        draft.execution_status = ExecutionStatus::Pending;
        let request_id = self.requests.create_as_initial_point(&draft).await?;

        let reservation = Reservation {
            id: Uuid::new_v4(),
            environment_id: call.environment.id,
            service_id: call.service.id,
            api_key_id: call.api_key.id,
            api_key_hash: key_hash,
            start_request_id: request_id,
            request_time,
            expires_at: now + self.ttl,
        };
        self.reservations.create(&reservation).await?;

        tracing::info!(
            reservation_id = %reservation.id,
            %request_id,
            environment_id = %reservation.environment_id,
            service_id = %reservation.service_id,
            expires_at = %reservation.expires_at,
            "Quota reserved"
        );

        Ok(ValidationResponse::accepted(request_id)
            .with_reservation(reservation.id)
            .with_available(snapshot.available_request))
    }

    /// Check that a call matches the reservation it claims, and record it
    /// as part of the reservation's chain.
    pub async fn validate_with_reservation(
        &self,
        reservation_id: Uuid,
        input: &ReservationValidateRequest,
    ) -> Result<ValidationResponse, AppError> {
        let now = Utc::now();
        let draft = NewRequest::new(input.request_time.unwrap_or(now), input.metadata.clone());

        let details = match self.reservations.get_by_id_with_details(reservation_id).await {
            Ok(details) => details,
            Err(err) if err.is_not_found() => {
                return self
                    .reject_initial(draft, Failure::new(FailureCode::ReservationNotFound))
                    .await;
            }
            Err(err) => return Err(err),
        };

        let mut draft = draft.chained_to(details.reservation.start_request_id);
        draft.api_key_id = Some(details.reservation.api_key_id);
        draft.service_id = Some(details.reservation.service_id);
        draft.environment_id = Some(details.reservation.environment_id);
        draft.project_id = Some(details.project_id);

        let key_hash = hash_api_key(&input.api_key);
        if let Some(code) = reservation_mismatch(&details, input, &key_hash, now) {
            draft.reject(code);
            let request_id = self.requests.create(&draft).await?;
            tracing::warn!(
                %reservation_id,
                %request_id,
                code = %code,
                "Reservation validation rejected"
            );
            return Ok(ValidationResponse::rejected(request_id, Failure::new(code))
                .with_reservation(reservation_id));
        }

        draft.execution_status = ExecutionStatus::Pending;
        let request_id = self.requests.create(&draft).await?;

        Ok(ValidationResponse::accepted(request_id).with_reservation(reservation_id))
    }

    /// Turn the reservation into a permanent consumption.
    ///
    /// # Errors
    ///
    /// `NotFound` if the reservation was already committed, rolled back or
    /// swept.
    pub async fn commit(&self, reservation_id: Uuid) -> Result<(), AppError> {
        self.reservations.delete(reservation_id).await?;
        tracing::info!(%reservation_id, "Reservation committed");
        Ok(())
    }

    /// Cancel the reservation and return its request to the pool.
    ///
    /// # Errors
    ///
    /// `NotFound` if the reservation no longer exists.
    pub async fn rollback(&self, reservation_id: Uuid) -> Result<(), AppError> {
        let reservation = self.reservations.get_by_id(reservation_id).await?;
        self.release(&reservation).await?;
        tracing::info!(
            %reservation_id,
            environment_id = %reservation.environment_id,
            service_id = %reservation.service_id,
            "Reservation rolled back"
        );
        Ok(())
    }

    /// Roll back up to `limit` reservations that expired at or before `now`.
    ///
    /// Reservations committed or rolled back while the sweep runs are
    /// skipped. Returns how many were reclaimed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>, limit: u32) -> Result<usize, AppError> {
        let expired = self.reservations.list_expired(now, limit).await?;
        let mut reclaimed = 0;

        for reservation in &expired {
            match self.release(reservation).await {
                Ok(()) => reclaimed += 1,
                Err(err) if err.is_not_found() => {
                    tracing::debug!(
                        reservation_id = %reservation.id,
                        "Expired reservation resolved before sweep"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Ok(reclaimed)
    }

    /// Delete, then give the unit back. The increment only runs if this
    /// caller's delete removed the row.
    async fn release(&self, reservation: &Reservation) -> Result<(), AppError> {
        self.reservations.delete(reservation.id).await?;
        self.environments
            .increase_available_request(reservation.environment_id, reservation.service_id)
            .await
    }

    async fn reject_initial(
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
            "Reservation rejected"
        );

        Ok(ValidationResponse::rejected(request_id, failure))
    }
}

/// First way in which a call does not match its reservation, if any.
fn reservation_mismatch(
    details: &ReservationDetails,
    input: &ReservationValidateRequest,
    key_hash: &str,
    now: DateTime<Utc>,
) -> Option<FailureCode> {
    if details.reservation.api_key_hash != key_hash {
        Some(FailureCode::InvalidApiKey)
    } else if details.service_name != input.service {
        Some(FailureCode::InvalidService)
    } else if details.service_version != input.version {
        Some(FailureCode::InvalidServiceVersion)
    } else if details.service_status != ServiceStatus::Enabled {
        Some(FailureCode::ServiceNotActive)
    } else if details.environment_name != input.environment {
        Some(FailureCode::InvalidEnvironment)
    } else if details.environment_status != EnvironmentStatus::Enabled {
        Some(FailureCode::EnvironmentNotActive)
    } else if details.reservation.is_expired(now) {
        Some(FailureCode::ReservationExpired)
    } else {
        None
    }
}
