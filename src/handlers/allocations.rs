//! Quota allocation endpoint.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{environment::EnvironmentService, validation::AllocateQuotaRequest},
    state::AppState,
};

/// Set an environment's quota for a service.
///
/// # Endpoint
///
/// `PUT /api/v1/environments/{environment_id}/services/{service_id}/quota`
///
/// # Request Body
///
/// ```json
/// { "max_request": 500 }
/// ```
///
/// `-1` asks for unlimited quota, which only an unlimited project grant
/// allows.
///
/// # Response
///
/// - **200 OK**: the stored grant
/// - **400**: malformed body or a quota outside `-1..=2147483647`, over the
///   project limit, or no project grant for the service
/// - **404**: unknown environment
pub async fn allocate_quota(
    State(state): State<AppState>,
    Path((environment_id, service_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<AllocateQuotaRequest>, JsonRejection>,
) -> Result<Json<EnvironmentService>, AppError> {
    let Json(request) = payload?;
    let grant = state
        .allocator
        .assign(environment_id, service_id, request.max_request)
        .await?;
    Ok(Json(grant))
}
