use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::request::NewRequest,
    repositories::RequestRepository,
};

#[derive(Debug, Clone)]
pub struct PgRequestRepository {
    pool: DbPool,
}

impl PgRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, record: &NewRequest, start_point: Uuid) -> Result<Uuid, AppError> {
        let metadata = &record.metadata;
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO requests (
                id,
                start_point,
                api_key_id,
                service_id,
                environment_id,
                project_id,
                execution_status,
                unauthorized_reason,
                request_time,
                path,
                method,
                ip_address,
                body,
                headers,
                query_params,
                content_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            "#,
        )
        .bind(record.id)
        .bind(start_point)
        .bind(record.api_key_id)
        .bind(record.service_id)
        .bind(record.environment_id)
        .bind(record.project_id)
        .bind(record.execution_status)
        .bind(record.unauthorized_reason.map(|code| code.as_str()))
        .bind(record.request_time)
        .bind(metadata.path.as_deref())
        .bind(metadata.method.as_deref())
        .bind(metadata.ip_address.as_deref())
        .bind(metadata.body.as_ref())
        .bind(metadata.headers.as_ref())
        .bind(metadata.query_params.as_ref())
        .bind(metadata.content_type.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl RequestRepository for PgRequestRepository {
    async fn create(&self, record: &NewRequest) -> Result<Uuid, AppError> {
        let start_point = record.start_point.ok_or_else(|| {
            AppError::Internal("chained request record is missing its start point".to_string())
        })?;
        self.insert(record, start_point).await
    }

    async fn create_as_initial_point(&self, record: &NewRequest) -> Result<Uuid, AppError> {
        self.insert(record, record.id).await
    }
}
