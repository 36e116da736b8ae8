//! Request audit records.
//!
//! Every validation call persists exactly one record, authorized or not.
//! Records are append-only from this crate's point of view; a downstream
//! component refines `execution_status` later, correlating on `start_point`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::validation::FailureCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Forwarded,
    Pending,
    Unauthorized,
    QuotaExceeded,
    Success,
    ClientError,
    ServerError,
}

/// Optional details about the inbound call being authorized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RequestMetadata {
    #[validate(length(max = 2048, message = "path is too long"))]
    pub path: Option<String>,
    #[validate(length(max = 16, message = "method is too long"))]
    pub method: Option<String>,
    pub ip_address: Option<String>,
    pub body: Option<serde_json::Value>,
    pub headers: Option<serde_json::Value>,
    pub query_params: Option<serde_json::Value>,
    pub content_type: Option<String>,
}

/// An audit record about to be written.
///
/// The id is generated up front so a record can be its own start point.
/// Flows fill in every resolved reference before persisting, regardless of
/// the final outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequest {
    pub id: Uuid,
    pub start_point: Option<Uuid>,
    pub api_key_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub environment_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub execution_status: ExecutionStatus,
    pub unauthorized_reason: Option<FailureCode>,
    pub request_time: DateTime<Utc>,
    pub metadata: RequestMetadata,
}

impl NewRequest {
    pub fn new(request_time: DateTime<Utc>, metadata: RequestMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_point: None,
            api_key_id: None,
            service_id: None,
            environment_id: None,
            project_id: None,
            execution_status: ExecutionStatus::Forwarded,
            unauthorized_reason: None,
            request_time,
            metadata,
        }
    }

    /// Mark the record as rejected with `code`.
    ///
    /// Quota exhaustion is recorded as `quota_exceeded`; every other failure
    /// is `unauthorized` with the code kept as the reason.
    pub fn reject(&mut self, code: FailureCode) {
        self.execution_status = if code.is_quota_exhaustion() {
            ExecutionStatus::QuotaExceeded
        } else {
            ExecutionStatus::Unauthorized
        };
        self.unauthorized_reason = Some(code);
    }

    /// Chain this record onto an earlier one.
    pub fn chained_to(mut self, start_point: Uuid) -> Self {
        self.start_point = Some(start_point);
        self
    }
}
