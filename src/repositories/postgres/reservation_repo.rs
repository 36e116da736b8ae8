use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::reservation::{Reservation, ReservationDetails},
    repositories::ReservationRepository,
};

const RESERVATION_COLUMNS: &str = "\
    id, environment_id, service_id, api_key_id, api_key_hash, \
    start_request_id, request_time, expires_at";

#[derive(Debug, Clone)]
pub struct PgReservationRepository {
    pool: DbPool,
}

impl PgReservationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn create(&self, reservation: &Reservation) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO reservations ({RESERVATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        sqlx::query(&query)
            .bind(reservation.id)
            .bind(reservation.environment_id)
            .bind(reservation.service_id)
            .bind(reservation.api_key_id)
            .bind(&reservation.api_key_hash)
            .bind(reservation.start_request_id)
            .bind(reservation.request_time)
            .bind(reservation.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_by_id(&self, reservation_id: Uuid) -> Result<Reservation, AppError> {
        let query = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        sqlx::query_as::<_, Reservation>(&query)
            .bind(reservation_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Reservation"))
    }

    async fn get_by_id_with_details(
        &self,
        reservation_id: Uuid,
    ) -> Result<ReservationDetails, AppError> {
        sqlx::query_as::<_, ReservationDetails>(
            r#"
            SELECT r.id, r.environment_id, r.service_id, r.api_key_id, r.api_key_hash,
                   r.start_request_id, r.request_time, r.expires_at,
                   s.name AS service_name,
                   s.version AS service_version,
                   s.status AS service_status,
                   e.name AS environment_name,
                   e.status AS environment_status,
                   e.project_id
            FROM reservations r
            JOIN services s ON s.id = r.service_id
            JOIN environments e ON e.id = r.environment_id
            WHERE r.id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Reservation"))
    }

    async fn count_by_environment_and_service(
        &self,
        environment_id: Uuid,
        service_id: Uuid,
    ) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE environment_id = $1 AND service_id = $2",
        )
        .bind(environment_id)
        .bind(service_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn delete(&self, reservation_id: Uuid) -> Result<(), AppError> {
        let deleted = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(AppError::NotFound("Reservation"));
        }
        Ok(())
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Reservation>, AppError> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE expires_at <= $1 ORDER BY expires_at LIMIT $2"
        );
        let reservations = sqlx::query_as::<_, Reservation>(&query)
            .bind(now)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(reservations)
    }
}
