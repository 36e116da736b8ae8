use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{db::DbPool, error::AppError, models::api_key::ApiKey, repositories::ApiKeyRepository};

const API_KEY_COLUMNS: &str = "id, key_hash, status, expires_at, last_used, environment_id";

#[derive(Debug, Clone)]
pub struct PgApiKeyRepository {
    pool: DbPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    async fn get_by_key(&self, key_hash: &str) -> Result<ApiKey, AppError> {
        let query = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1");
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("API key"))
    }

    async fn update_last_used(
        &self,
        api_key_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_used = $1 WHERE id = $2")
            .bind(at)
            .bind(api_key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
