//! Reads and writes behind quota allocation.
//!
//! Grant writes are optimistic: an update only applies if the stored
//! ceiling and counter still match what the allocator read, so a decrement
//! landing in between is never overwritten.
//!
//! Each write runs in a transaction holding the project grant row
//! (`FOR UPDATE`), so sibling environments are allocated one at a time and
//! the project ceiling is checked against committed sibling ceilings.

use async_trait::async_trait;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        environment::{EnvironmentService, EnvironmentServiceRow},
        project::QuotaUsage,
        quota::Quota,
    },
    repositories::{GrantVersion, QuotaAllocationRepository},
};

const GRANT_COLUMNS: &str =
    "environment_id, service_id, max_request, available_request, assigned_at";

#[derive(Debug, sqlx::FromRow)]
struct QuotaUsageRow {
    max_allowed: Option<i32>,
    current_allocated: i64,
    has_unlimited_sibling: bool,
}

#[derive(Debug, Clone)]
pub struct PgQuotaAllocationRepository {
    pool: DbPool,
}

impl PgQuotaAllocationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Ceiling of the project grant and what the environment's siblings hold.
const QUOTA_USAGE_QUERY: &str = r#"
    SELECT ps.max_request AS max_allowed,
           COALESCE(SUM(es.max_request) FILTER (
               WHERE es.environment_id IS NOT NULL AND es.environment_id <> $1
           ), 0)::BIGINT AS current_allocated,
           COALESCE(BOOL_OR(es.max_request IS NULL) FILTER (
               WHERE es.environment_id IS NOT NULL AND es.environment_id <> $1
           ), FALSE) AS has_unlimited_sibling
    FROM environments e
    JOIN project_services ps
      ON ps.project_id = e.project_id AND ps.service_id = $2
    LEFT JOIN environments sibling
      ON sibling.project_id = e.project_id
    LEFT JOIN environment_services es
      ON es.environment_id = sibling.id AND es.service_id = $2
    WHERE e.id = $1
    GROUP BY ps.max_request
"#;

async fn fetch_quota_usage<'e>(
    executor: impl PgExecutor<'e>,
    environment_id: Uuid,
    service_id: Uuid,
) -> Result<Option<QuotaUsage>, AppError> {
    let row = sqlx::query_as::<_, QuotaUsageRow>(QUOTA_USAGE_QUERY)
        .bind(environment_id)
        .bind(service_id)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|row| QuotaUsage {
        max_allowed: Quota::from_column(row.max_allowed),
        current_allocated: row.current_allocated.max(0) as u64,
        has_unlimited_sibling: row.has_unlimited_sibling,
    }))
}

#[async_trait]
impl QuotaAllocationRepository for PgQuotaAllocationRepository {
    async fn get_project_service_quota_usage(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<QuotaUsage>, AppError> {
        fetch_quota_usage(&self.pool, environment_id, service_id).await
    }

    async fn get_environment_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<EnvironmentService>, AppError> {
        let query = format!(
            "SELECT {GRANT_COLUMNS} FROM environment_services \
             WHERE environment_id = $1 AND service_id = $2"
        );
        let row = sqlx::query_as::<_, EnvironmentServiceRow>(&query)
            .bind(environment_id)
            .bind(service_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(EnvironmentService::from))
    }

    async fn save_environment_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
        expected: Option<GrantVersion>,
        max_request: Quota,
        available_request: Quota,
    ) -> Result<Option<EnvironmentService>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Siblings wait here until this allocation commits or rolls back.
        let locked = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT ps.project_id
            FROM project_services ps
            JOIN environments e ON e.project_id = ps.project_id
            WHERE e.id = $1 AND ps.service_id = $2
            FOR UPDATE OF ps
            "#,
        )
        .bind(environment_id)
        .bind(service_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(AppError::Validation("service not assigned to project".into()));
        }

        let usage = fetch_quota_usage(&mut *tx, environment_id, service_id)
            .await?
            .ok_or_else(|| AppError::Validation("service not assigned to project".into()))?;
        usage.admit(max_request)?;

        let row = match expected {
            None => {
                let query = format!(
                    "INSERT INTO environment_services \
                         (environment_id, service_id, max_request, available_request) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (environment_id, service_id) DO NOTHING \
                     RETURNING {GRANT_COLUMNS}"
                );
                sqlx::query_as::<_, EnvironmentServiceRow>(&query)
                    .bind(environment_id)
                    .bind(service_id)
                    .bind(max_request.to_column()?)
                    .bind(available_request.to_column()?)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            Some(version) => {
                let query = format!(
                    "UPDATE environment_services \
                     SET max_request = $3, available_request = $4 \
                     WHERE environment_id = $1 AND service_id = $2 \
                       AND max_request IS NOT DISTINCT FROM $5 \
                       AND available_request IS NOT DISTINCT FROM $6 \
                     RETURNING {GRANT_COLUMNS}"
                );
                sqlx::query_as::<_, EnvironmentServiceRow>(&query)
                    .bind(environment_id)
                    .bind(service_id)
                    .bind(max_request.to_column()?)
                    .bind(available_request.to_column()?)
                    .bind(version.max_request.to_column()?)
                    .bind(version.available_request.to_column()?)
                    .fetch_optional(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;

        Ok(row.map(EnvironmentService::from))
    }
}
