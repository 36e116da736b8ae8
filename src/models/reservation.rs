//! Reservations: provisional quota debits awaiting commit or rollback.
//!
//! There is no "committed" row. A reservation exists only while it is
//! pending; commit and rollback both delete it, and only rollback returns the
//! unit to the pool.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{environment::EnvironmentStatus, service::ServiceStatus};

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Reservation {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub service_id: Uuid,
    pub api_key_id: Uuid,
    /// SHA-256 of the key that made the reservation.
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    /// Audit record that triggered the reservation.
    pub start_request_id: Uuid,
    pub request_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A reservation joined with the current state of its service and
/// environment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationDetails {
    #[sqlx(flatten)]
    pub reservation: Reservation,
    pub service_name: String,
    pub service_version: String,
    pub service_status: ServiceStatus,
    pub environment_name: String,
    pub environment_status: EnvironmentStatus,
    pub project_id: Uuid,
}
