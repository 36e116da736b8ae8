//! Validation request/response types and the failure-code vocabulary.
//!
//! Failure codes are the only business-rule outcome that crosses the wire:
//! callers get `{valid: false, code, message}` and never an internal error
//! type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{project::ConsumerInfo, quota::Quota, request::RequestMetadata};

/// Why a call was not authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    ServiceMismatch,
    ServiceDisabled,
    ServiceDeprecated,
    ApiKeyInvalid,
    ApiKeyDisabled,
    ApiKeyExpired,
    EnvironmentMismatch,
    EnvironmentDisabled,
    ServiceNotAssigned,
    EnvironmentServiceInvalid,
    ExceededAvailableRequest,
    ActiveReservations,
    InvalidApiKey,
    InvalidService,
    InvalidServiceVersion,
    ServiceNotActive,
    InvalidEnvironment,
    EnvironmentNotActive,
    ReservationNotFound,
    ReservationExpired,
}

impl FailureCode {
    /// Wire form, e.g. `API_KEY_EXPIRED`.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCode::ServiceMismatch => "SERVICE_MISMATCH",
            FailureCode::ServiceDisabled => "SERVICE_DISABLED",
            FailureCode::ServiceDeprecated => "SERVICE_DEPRECATED",
            FailureCode::ApiKeyInvalid => "API_KEY_INVALID",
            FailureCode::ApiKeyDisabled => "API_KEY_DISABLED",
            FailureCode::ApiKeyExpired => "API_KEY_EXPIRED",
            FailureCode::EnvironmentMismatch => "ENVIRONMENT_MISMATCH",
            FailureCode::EnvironmentDisabled => "ENVIRONMENT_DISABLED",
            FailureCode::ServiceNotAssigned => "SERVICE_NOT_ASSIGNED",
            FailureCode::EnvironmentServiceInvalid => "ENVIRONMENT_SERVICE_INVALID",
            FailureCode::ExceededAvailableRequest => "EXCEEDED_AVAILABLE_REQUEST",
            FailureCode::ActiveReservations => "ACTIVE_RESERVATIONS",
            FailureCode::InvalidApiKey => "INVALID_API_KEY",
            FailureCode::InvalidService => "INVALID_SERVICE",
            FailureCode::InvalidServiceVersion => "INVALID_SERVICE_VERSION",
            FailureCode::ServiceNotActive => "SERVICE_NOT_ACTIVE",
            FailureCode::InvalidEnvironment => "INVALID_ENVIRONMENT",
            FailureCode::EnvironmentNotActive => "ENVIRONMENT_NOT_ACTIVE",
            FailureCode::ReservationNotFound => "RESERVATION_NOT_FOUND",
            FailureCode::ReservationExpired => "RESERVATION_EXPIRED",
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            FailureCode::ServiceMismatch => "service not found for the given name and version",
            FailureCode::ServiceDisabled => "service is disabled",
            FailureCode::ServiceDeprecated => "service is deprecated",
            FailureCode::ApiKeyInvalid => "api key is invalid",
            FailureCode::ApiKeyDisabled => "api key is disabled",
            FailureCode::ApiKeyExpired => "api key has expired",
            FailureCode::EnvironmentMismatch => "api key does not belong to this environment",
            FailureCode::EnvironmentDisabled => "environment is disabled",
            FailureCode::ServiceNotAssigned => "service is not assigned to this environment",
            FailureCode::EnvironmentServiceInvalid => {
                "service not assigned to this environment"
            }
            FailureCode::ExceededAvailableRequest => "available requests exhausted",
            FailureCode::ActiveReservations => {
                "reservations are being processed, try again later"
            }
            FailureCode::InvalidApiKey => "api key does not match the reservation",
            FailureCode::InvalidService => "service does not match the reservation",
            FailureCode::InvalidServiceVersion => {
                "service version does not match the reservation"
            }
            FailureCode::ServiceNotActive => "reserved service is not active",
            FailureCode::InvalidEnvironment => "environment does not match the reservation",
            FailureCode::EnvironmentNotActive => "reserved environment is not active",
            FailureCode::ReservationNotFound => "reservation not found",
            FailureCode::ReservationExpired => "reservation has expired",
        }
    }

    /// Failures recorded as `quota_exceeded` rather than `unauthorized`.
    pub fn is_quota_exhaustion(self) -> bool {
        matches!(
            self,
            FailureCode::ExceededAvailableRequest | FailureCode::ActiveReservations
        )
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure code with the message shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: FailureCode,
    pub message: String,
}

impl Failure {
    pub fn new(code: FailureCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    /// Quota is held by pending reservations rather than truly spent.
    pub fn active_reservations(count: u64) -> Self {
        Self {
            code: FailureCode::ActiveReservations,
            message: format!(
                "{count} reservations are being processed for this service, try again later"
            ),
        }
    }
}

impl From<FailureCode> for Failure {
    fn from(code: FailureCode) -> Self {
        Failure::new(code)
    }
}

/// Request body shared by the validate, consume and reserve operations.
///
/// # JSON Example
///
/// ```json
/// {
///   "api_key": "sk_live_...",
///   "service": "billing",
///   "version": "v1",
///   "environment": "production",
///   "path": "/invoices",
///   "method": "GET"
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ValidateRequest {
    #[validate(length(min = 1, max = 255, message = "api_key is required"))]
    pub api_key: String,

    #[validate(length(min = 1, max = 255, message = "service is required"))]
    pub service: String,

    #[validate(length(min = 1, max = 64, message = "version is required"))]
    pub version: String,

    #[validate(length(min = 1, max = 255, message = "environment is required"))]
    pub environment: String,

    /// Defaults to the time the request reached the gateway.
    #[serde(default)]
    pub request_time: Option<DateTime<Utc>>,

    #[serde(flatten)]
    #[validate(nested)]
    pub metadata: RequestMetadata,
}

/// Request body for validating against an existing reservation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReservationValidateRequest {
    #[validate(length(min = 1, max = 255, message = "api_key is required"))]
    pub api_key: String,

    #[validate(length(min = 1, max = 255, message = "service is required"))]
    pub service: String,

    #[validate(length(min = 1, max = 64, message = "version is required"))]
    pub version: String,

    #[validate(length(min = 1, max = 255, message = "environment is required"))]
    pub environment: String,

    #[serde(default)]
    pub request_time: Option<DateTime<Utc>>,

    #[serde(flatten)]
    #[validate(nested)]
    pub metadata: RequestMetadata,
}

/// Body for setting an environment's quota on a service.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AllocateQuotaRequest {
    /// `-1` for unlimited.
    pub max_request: Quota,
}

/// Outcome of every entry operation.
///
/// # JSON Examples
///
/// ```json
/// { "valid": true, "request_id": "…", "available_request": 41 }
/// ```
///
/// ```json
/// { "valid": false, "request_id": "…", "code": "API_KEY_EXPIRED", "message": "api key has expired" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_request: Option<Quota>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<FailureCode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer: Option<ConsumerInfo>,
}

impl ValidationResponse {
    pub fn accepted(request_id: Uuid) -> Self {
        Self {
            valid: true,
            request_id: Some(request_id),
            reservation_id: None,
            available_request: None,
            code: None,
            message: None,
            consumer: None,
        }
    }

    pub fn rejected(request_id: Uuid, failure: Failure) -> Self {
        Self {
            valid: false,
            request_id: Some(request_id),
            reservation_id: None,
            available_request: None,
            code: Some(failure.code),
            message: Some(failure.message),
            consumer: None,
        }
    }

    pub fn with_available(mut self, available: Quota) -> Self {
        self.available_request = Some(available);
        self
    }

    pub fn with_reservation(mut self, reservation_id: Uuid) -> Self {
        self.reservation_id = Some(reservation_id);
        self
    }

    pub fn with_consumer(mut self, consumer: Option<ConsumerInfo>) -> Self {
        self.consumer = consumer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_codes_serialize_as_screaming_snake_case() {
        let json = serde_json::to_value(FailureCode::ExceededAvailableRequest).unwrap();
        assert_eq!(json, "EXCEEDED_AVAILABLE_REQUEST");
        let json = serde_json::to_value(FailureCode::InvalidServiceVersion).unwrap();
        assert_eq!(json, FailureCode::InvalidServiceVersion.as_str());
    }

    #[test]
    fn active_reservation_message_carries_count() {
        let failure = Failure::active_reservations(3);
        assert_eq!(failure.code, FailureCode::ActiveReservations);
        assert!(failure.message.starts_with("3 reservations are being processed"));
    }

    #[test]
    fn rejected_response_omits_quota_fields() {
        let response = ValidationResponse::rejected(Uuid::nil(), FailureCode::ApiKeyInvalid.into());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["code"], "API_KEY_INVALID");
        assert!(json.get("available_request").is_none());
        assert!(json.get("reservation_id").is_none());
    }

    #[test]
    fn unlimited_availability_reports_minus_one() {
        let response = ValidationResponse::accepted(Uuid::nil()).with_available(Quota::Unlimited);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["available_request"], -1);
    }

    #[test]
    fn empty_fields_fail_validation() {
        let request: ValidateRequest = serde_json::from_value(serde_json::json!({
            "api_key": "",
            "service": "billing",
            "version": "",
            "environment": "production"
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("api_key"));
        assert!(fields.contains_key("version"));
        assert!(!fields.contains_key("service"));
    }
}
