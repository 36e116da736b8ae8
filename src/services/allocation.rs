//! Handing a project's service quota out to its environments.
//!
//! Environment ceilings under one project grant never add up to more than
//! the project ceiling. An unlimited project grant places no constraint.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        environment::EnvironmentService,
        quota::{Quota, rebalance_available},
    },
    repositories::{EnvironmentRepository, GrantVersion, QuotaAllocationRepository, Repositories},
};

/// Optimistic writes give up after this many lost races.
const MAX_ALLOCATION_ATTEMPTS: usize = 3;

pub struct QuotaAllocator {
    environments: Arc<dyn EnvironmentRepository>,
    allocations: Arc<dyn QuotaAllocationRepository>,
}

impl QuotaAllocator {
    pub fn new(repositories: &Repositories) -> Self {
        Self {
            environments: repositories.environments.clone(),
            allocations: repositories.allocations.clone(),
        }
    }

    /// Create or resize the grant of `service_id` in `environment_id`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the environment does not exist
    /// - `Validation` if the ceiling is larger than a grant can store, if the
    ///   project has no grant for the service, if the new ceiling would
    ///   overflow the project grant, or if the grant kept changing under
    ///   concurrent writers
    pub async fn assign(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
        max_request: Quota,
    ) -> Result<EnvironmentService, AppError> {
        max_request.to_column()?;
        self.environments.get_by_id(environment_id).await?;

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let usage = self
                .allocations
                .get_project_service_quota_usage(environment_id, service_id)
                .await?
                .ok_or_else(|| AppError::Validation("service not assigned to project".into()))?;
            usage.admit(max_request)?;

            let current = self
                .allocations
                .get_environment_service(environment_id, service_id)
                .await?;

            let (expected, available) = match &current {
                None => (None, max_request),
                Some(grant) => (
                    Some(GrantVersion {
                        max_request: grant.max_request,
                        available_request: grant.available_request,
                    }),
                    rebalance_available(grant.max_request, grant.available_request, max_request),
                ),
            };

            // The store re-checks the project ceiling while holding the
            // project grant, so siblings cannot overshoot it together.
            if let Some(saved) = self
                .allocations
                .save_environment_service(environment_id, service_id, expected, max_request, available)
                .await?
            {
                tracing::info!(
                    %environment_id,
                    %service_id,
                    max_request = max_request.as_wire(),
                    available_request = saved.available_request.as_wire(),
                    "Quota allocated"
                );
                return Ok(saved);
            }

            tracing::debug!(%environment_id, %service_id, attempt, "Grant changed concurrently");
        }

        Err(AppError::Validation(
            "environment quota changed concurrently, retry".into(),
        ))
    }
}
