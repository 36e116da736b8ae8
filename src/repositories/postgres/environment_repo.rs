//! Environment lookups and the quota counter primitives.
//!
//! The decrement and increment are single conditional `UPDATE` statements.
//! Postgres takes the row lock for the duration of the statement, so any
//! number of concurrent callers can never push the counter below zero or
//! above its ceiling.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        environment::{Environment, QuotaDiagnosis},
        quota::{Quota, QuotaSnapshot},
    },
    repositories::EnvironmentRepository,
};

#[derive(Debug, Clone)]
pub struct PgEnvironmentRepository {
    pool: DbPool,
}

impl PgEnvironmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnvironmentRepository for PgEnvironmentRepository {
    async fn get_by_id(&self, environment_id: Uuid) -> Result<Environment, AppError> {
        sqlx::query_as::<_, Environment>(
            "SELECT id, name, status, project_id FROM environments WHERE id = $1",
        )
        .bind(environment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Environment"))
    }

    async fn exists_service_in(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM environment_services
                WHERE environment_id = $1 AND service_id = $2
            )",
        )
        .bind(environment_id)
        .bind(service_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn missing_resource_diagnosis(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<QuotaDiagnosis, AppError> {
        // Outer Option: grant row present. Inner: NULL counter (unlimited).
        let available: Option<Option<i32>> = sqlx::query_scalar(
            "SELECT available_request FROM environment_services
             WHERE environment_id = $1 AND service_id = $2",
        )
        .bind(environment_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match available {
            None => QuotaDiagnosis {
                grant_exists: false,
                has_available_capacity: false,
            },
            Some(counter) => QuotaDiagnosis {
                grant_exists: true,
                has_available_capacity: Quota::from_column(counter).has_capacity(),
            },
        })
    }

    async fn decrement_available_request(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<QuotaSnapshot, AppError> {
        // NULL - 1 stays NULL, so unlimited grants match without changing.
        let row: Option<(Option<i32>, Option<i32>)> = sqlx::query_as(
            r#"
            UPDATE environment_services
            SET available_request = available_request - 1
            WHERE environment_id = $1
              AND service_id = $2
              AND (available_request IS NULL OR available_request > 0)
            RETURNING max_request, available_request
            "#,
        )
        .bind(environment_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        let (max_request, available_request) =
            row.ok_or(AppError::NotFound("Environment service quota"))?;

        Ok(QuotaSnapshot {
            max_request: Quota::from_column(max_request),
            available_request: Quota::from_column(available_request),
        })
    }

    async fn increase_available_request(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE environment_services
            SET available_request = available_request + 1
            WHERE environment_id = $1
              AND service_id = $2
              AND available_request IS NOT NULL
              AND available_request < max_request
            "#,
        )
        .bind(environment_id)
        .bind(service_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            tracing::debug!(
                %environment_id,
                %service_id,
                "Quota increase skipped (unlimited, full, or grant removed)"
            );
        }

        Ok(())
    }
}
