//! Environments and their service grants.
//!
//! An [`EnvironmentService`] is the unit the quota engine mutates: every
//! authorized call decrements its `available_request` counter exactly once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::quota::Quota;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "environment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Enabled,
    Disabled,
}

/// Represents an environment record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Environment {
    pub id: Uuid,
    pub name: String,
    pub status: EnvironmentStatus,
    pub project_id: Uuid,
}

impl Environment {
    pub fn is_enabled(&self) -> bool {
        self.status == EnvironmentStatus::Enabled
    }
}

/// Grant of a service to an environment, with its quota.
///
/// Invariant: when `max_request` is bounded, so is `available_request`, and
/// `available_request <= max_request`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentService {
    pub environment_id: Uuid,
    pub service_id: Uuid,
    pub max_request: Quota,
    pub available_request: Quota,
    pub assigned_at: DateTime<Utc>,
}

/// Row shape of `environment_services`; quota columns are nullable.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EnvironmentServiceRow {
    pub environment_id: Uuid,
    pub service_id: Uuid,
    pub max_request: Option<i32>,
    pub available_request: Option<i32>,
    pub assigned_at: DateTime<Utc>,
}

impl From<EnvironmentServiceRow> for EnvironmentService {
    fn from(row: EnvironmentServiceRow) -> Self {
        Self {
            environment_id: row.environment_id,
            service_id: row.service_id,
            max_request: Quota::from_column(row.max_request),
            available_request: Quota::from_column(row.available_request),
            assigned_at: row.assigned_at,
        }
    }
}

/// Outcome of inspecting a grant after a decrement matched no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDiagnosis {
    /// The service is granted to the environment at all.
    pub grant_exists: bool,
    /// The grant still has at least one request left.
    pub has_available_capacity: bool,
}
