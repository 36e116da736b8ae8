//! Project-level grants and consumer context.

use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppError, models::quota::Quota};

/// Client and project owning an environment. Attached to validation
/// verdicts so even rejected calls can be attributed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct ProjectContext {
    pub client_id: Uuid,
    pub client_name: String,
    pub project_id: Uuid,
    pub project_name: String,
}

/// Consumer identity reported by the validation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerInfo {
    pub client_id: Uuid,
    pub client_name: String,
    pub project_id: Uuid,
    pub project_name: String,
    pub environment_id: Uuid,
    pub environment_name: String,
}

impl ConsumerInfo {
    pub fn new(project: ProjectContext, environment_id: Uuid, environment_name: String) -> Self {
        Self {
            client_id: project.client_id,
            client_name: project.client_name,
            project_id: project.project_id,
            project_name: project.project_name,
            environment_id,
            environment_name,
        }
    }
}

/// How much of a project grant is handed out to its environments.
///
/// `current_allocated` covers every sibling environment except the one an
/// allocation is being computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    /// Ceiling of the project grant.
    pub max_allowed: Quota,
    /// Sum of bounded sibling ceilings.
    pub current_allocated: u64,
    /// At least one sibling grant is unlimited.
    pub has_unlimited_sibling: bool,
}

impl QuotaUsage {
    /// Whether `requested` fits in the project grant next to the siblings.
    pub fn admit(&self, requested: Quota) -> Result<(), AppError> {
        let Some(ceiling) = self.max_allowed.bound() else {
            return Ok(());
        };

        let Some(requested) = requested.bound() else {
            return Err(AppError::Validation(
                "unlimited quota not allowed under a bounded project quota".into(),
            ));
        };

        if self.has_unlimited_sibling {
            return Err(AppError::Validation(
                "another environment already holds unlimited quota for this service".into(),
            ));
        }

        let total = self.current_allocated + u64::from(requested);
        if total > u64::from(ceiling) {
            return Err(AppError::Validation(format!(
                "requested quota exceeds project limit: {total} of {ceiling} allocated"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn usage(max_allowed: Quota, current_allocated: u64) -> QuotaUsage {
        QuotaUsage {
            max_allowed,
            current_allocated,
            has_unlimited_sibling: false,
        }
    }

    #[test]
    fn unlimited_project_accepts_anything() {
        let usage = QuotaUsage {
            has_unlimited_sibling: true,
            ..usage(Quota::Unlimited, 1_000_000)
        };
        assert!(usage.admit(Quota::Unlimited).is_ok());
        assert!(usage.admit(Quota::Bounded(Quota::MAX_BOUNDED)).is_ok());
    }

    #[test]
    fn bounded_project_fits_up_to_ceiling() {
        let usage = usage(Quota::Bounded(100), 60);
        assert!(usage.admit(Quota::Bounded(40)).is_ok());
        assert_matches!(
            usage.admit(Quota::Bounded(41)),
            Err(AppError::Validation(msg)) if msg.contains("101 of 100")
        );
    }

    #[test]
    fn bounded_project_rejects_unlimited_environment() {
        let usage = usage(Quota::Bounded(100), 0);
        assert_matches!(usage.admit(Quota::Unlimited), Err(AppError::Validation(_)));
    }

    #[test]
    fn unlimited_sibling_blocks_bounded_project() {
        let usage = QuotaUsage {
            has_unlimited_sibling: true,
            ..usage(Quota::Bounded(100), 0)
        };
        assert_matches!(usage.admit(Quota::Bounded(1)), Err(AppError::Validation(_)));
    }

    #[test]
    fn zero_quota_is_allowed() {
        assert!(usage(Quota::Bounded(10), 10).admit(Quota::Bounded(0)).is_ok());
    }
}
