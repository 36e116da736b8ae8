use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::DbPool, error::AppError, models::project::ProjectContext, repositories::ProjectRepository,
};

#[derive(Debug, Clone)]
pub struct PgProjectRepository {
    pool: DbPool,
}

impl PgProjectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn get_project_context_by_id(
        &self,
        project_id: Uuid,
    ) -> Result<ProjectContext, AppError> {
        sqlx::query_as::<_, ProjectContext>(
            r#"
            SELECT c.id AS client_id, c.name AS client_name,
                   p.id AS project_id, p.name AS project_name
            FROM projects p
            JOIN clients c ON c.id = p.client_id
            WHERE p.id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Project"))
    }
}
