//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly; no server is started.

use axum::{http::StatusCode, response::IntoResponse};
use http_body_util::BodyExt;
use quota_gateway::{error::AppError, models::validation::ValidateRequest};
use validator::Validate;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_returns_404() {
    let (status, json) = error_to_response(AppError::NotFound("Reservation")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert_eq!(json["error"]["message"], "Reservation not found");
}

#[tokio::test]
async fn row_not_found_returns_404_without_details() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["message"], "Resource not found");
}

#[tokio::test]
async fn validation_returns_400() {
    let (status, json) =
        error_to_response(AppError::Validation("requested quota exceeds project limit".into()))
            .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(
        json["error"]["message"],
        "requested quota exceeds project limit"
    );
}

#[tokio::test]
async fn already_exists_returns_409() {
    let (status, json) = error_to_response(AppError::AlreadyExists("duplicate".into())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "ALREADY_EXISTS");
}

#[tokio::test]
async fn unauthorized_and_forbidden_map_to_401_and_403() {
    let (status, _) = error_to_response(AppError::Unauthorized("no key".into())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = error_to_response(AppError::Forbidden("not yours".into())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn internal_errors_are_sanitized() {
    let (status, json) =
        error_to_response(AppError::Internal("connection reset by 10.0.0.3".into())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "INTERNAL");
    assert_eq!(json["error"]["message"], "An internal error occurred");

    let (status, _) = error_to_response(AppError::Database(sqlx::Error::PoolTimedOut)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn composite_uses_highest_priority_status() {
    let err = AppError::Composite(vec![
        AppError::Validation("api_key: api_key is required".into()),
        AppError::Forbidden("environment locked".into()),
        AppError::NotFound("Service"),
    ]);

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn field_errors_collapse_into_one_400() {
    let request: ValidateRequest = serde_json::from_value(serde_json::json!({
        "api_key": "",
        "service": "",
        "version": "v1",
        "environment": "production",
        "method": "NOT-A-REAL-HTTP-METHOD"
    }))
    .unwrap();

    let err: AppError = request.validate().unwrap_err().into();
    let AppError::Composite(inner) = &err else {
        panic!("expected composite, got {err:?}");
    };
    assert_eq!(inner.len(), 3);

    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
    let message = json["error"]["message"].as_str().unwrap();
    assert!(message.contains("api_key: api_key is required"));
    assert!(message.contains("method: method is too long"));
}
