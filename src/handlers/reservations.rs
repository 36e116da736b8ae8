//! Two-phase consumption endpoints.
//!
//! - POST /api/v1/reservations - Validate and reserve one request
//! - POST /api/v1/reservations/{id}/validate - Re-validate against a reservation
//! - POST /api/v1/reservations/{id}/commit - Keep the reserved request consumed
//! - POST /api/v1/reservations/{id}/rollback - Return the reserved request

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::validation::{ReservationValidateRequest, ValidateRequest, ValidationResponse},
    state::AppState,
};

/// Reserve one request of quota.
///
/// # Response (200)
///
/// ```json
/// {
///   "valid": true,
///   "request_id": "770e8400-...",
///   "reservation_id": "880e8400-...",
///   "available_request": 9
/// }
/// ```
pub async fn reserve(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationResponse>, AppError> {
    request.validate()?;
    Ok(Json(state.reservations.validate_and_reserve(&request).await?))
}

/// Check a follow-up call against its reservation.
///
/// An unknown reservation is a `valid: false` verdict with
/// `RESERVATION_NOT_FOUND`, not a 404.
pub async fn validate_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
    Json(request): Json<ReservationValidateRequest>,
) -> Result<Json<ValidationResponse>, AppError> {
    request.validate()?;
    Ok(Json(
        state
            .reservations
            .validate_with_reservation(reservation_id, &request)
            .await?,
    ))
}

/// # Response
///
/// - **204 No Content**: committed
/// - **404 Not Found**: already committed, rolled back or expired and swept
pub async fn commit(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.reservations.commit(reservation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Response
///
/// - **204 No Content**: rolled back, one request returned to the quota
/// - **404 Not Found**: the reservation no longer exists
pub async fn rollback(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.reservations.rollback(reservation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
