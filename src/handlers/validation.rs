//! Key validation and immediate consumption endpoints.
//!
//! - POST /api/v1/keys/validate - Validate a key without touching quota
//! - POST /api/v1/consume - Validate and consume one request
//!
//! A rejected call is still a `200 OK`: the verdict is in the body. Error
//! statuses are reserved for malformed input and infrastructure failures.

use axum::{Json, extract::State};
use validator::Validate;

use crate::{
    error::AppError,
    models::validation::{ValidateRequest, ValidationResponse},
    state::AppState,
};

/// Run the validation pipeline and record the call.
///
/// # Request Body
///
/// ```json
/// {
///   "api_key": "sk_live_...",
///   "service": "billing",
///   "version": "v1",
///   "environment": "production"
/// }
/// ```
///
/// # Response (200)
///
/// ```json
/// {
///   "valid": true,
///   "request_id": "770e8400-...",
///   "consumer": { "client_name": "Acme", "project_name": "Storefront", "...": "..." }
/// }
/// ```
pub async fn validate_key(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationResponse>, AppError> {
    request.validate()?;
    Ok(Json(state.pipeline.validate(&request).await?))
}

/// Validate the call and consume one request from its quota.
///
/// # Response (200)
///
/// ```json
/// { "valid": true, "request_id": "770e8400-...", "available_request": 41 }
/// ```
///
/// ```json
/// { "valid": false, "request_id": "770e8400-...", "code": "EXCEEDED_AVAILABLE_REQUEST", "message": "..." }
/// ```
pub async fn consume(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationResponse>, AppError> {
    request.validate()?;
    Ok(Json(state.consumption.validate_and_consume(&request).await?))
}
