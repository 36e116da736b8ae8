//! Explains a decrement that matched no row.
//!
//! The conditional decrement cannot tell "no grant" from "no capacity left",
//! so after the fact the grant is inspected and pending reservations are
//! counted to pick the right failure.

use uuid::Uuid;

use crate::{
    error::AppError,
    models::validation::{Failure, FailureCode},
    repositories::{EnvironmentRepository, ReservationRepository},
};

pub async fn diagnose_missing_quota(
    environments: &dyn EnvironmentRepository,
    reservations: &dyn ReservationRepository,
    environment_id: Uuid,
    service_id: Uuid,
) -> Result<Failure, AppError> {
    let diagnosis = environments
        .missing_resource_diagnosis(environment_id, service_id)
        .await?;

    if !diagnosis.grant_exists {
        return Ok(Failure::new(FailureCode::EnvironmentServiceInvalid));
    }

    if diagnosis.has_available_capacity {
        // Capacity came back between the decrement and this read (a
        // rollback or a quota raise). Report exhaustion; a retry will pass.
        tracing::debug!(
            %environment_id,
            %service_id,
            "Quota freed up after a failed decrement"
        );
        return Ok(Failure::new(FailureCode::ExceededAvailableRequest));
    }

    let pending = reservations
        .count_by_environment_and_service(environment_id, service_id)
        .await?;

    Ok(match pending {
        0 => Failure::new(FailureCode::ExceededAvailableRequest),
        count => Failure::active_reservations(count),
    })
}
