use async_trait::async_trait;

use crate::{db::DbPool, error::AppError, models::service::Service, repositories::ServiceRepository};

#[derive(Debug, Clone)]
pub struct PgServiceRepository {
    pool: DbPool,
}

impl PgServiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRepository for PgServiceRepository {
    async fn get_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Service, AppError> {
        sqlx::query_as::<_, Service>(
            "SELECT id, name, version, status FROM services WHERE name = $1 AND version = $2",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Service"))
    }
}
