//! Error types and HTTP error response handling.
//!
//! Only infrastructure and input errors live here. Business-rule rejections
//! (disabled key, exhausted quota, ...) are never errors: the entry flows
//! return them as a `ValidationResponse` with a `FailureCode`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

/// Closed set of infrastructure error codes surfaced to callers.
///
/// Ordered by priority: when several errors are aggregated, the variant
/// with the highest [`ErrorCode::priority`] decides the transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationFailed,
    AlreadyExists,
    Unauthorized,
    Forbidden,
    Internal,
}

impl ErrorCode {
    /// Higher wins when collapsing a composite error to a single code.
    pub fn priority(self) -> u8 {
        match self {
            ErrorCode::ValidationFailed => 1,
            ErrorCode::AlreadyExists => 2,
            ErrorCode::NotFound => 3,
            ErrorCode::Forbidden => 4,
            ErrorCode::Unauthorized => 5,
            ErrorCode::Internal => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: any `sqlx::Error`, classified by [`AppError::code`]
/// - **Resource Errors**: a looked-up entity does not exist
/// - **Input Errors**: request DTOs or allocation requests that break a rule
/// - **Composite**: several errors collected together (e.g. field validation)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The named entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request data or an allocation request is invalid.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Several errors reported at once. Each keeps its own code.
    #[error("{}", join_messages(.0))]
    Composite(Vec<AppError>),
}

fn join_messages(errors: &[AppError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    /// The code used for transport-status mapping.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Validation(_) => ErrorCode::ValidationFailed,
            AppError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            AppError::Unauthorized(_) => ErrorCode::Unauthorized,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::Internal(_) => ErrorCode::Internal,
            AppError::Composite(errors) => errors
                .iter()
                .map(AppError::code)
                .max_by_key(|code| code.priority())
                .unwrap_or(ErrorCode::Internal),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }

    /// Message safe to hand to a client. Internal details are never exposed.
    fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::Internal => "An internal error occurred".to_string(),
            ErrorCode::NotFound if matches!(self, AppError::Database(_)) => {
                "Resource not found".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Classify a sqlx error.
///
/// - `RowNotFound` maps to `NotFound`.
/// - Unique constraint violations (Postgres `23505`) map to `AlreadyExists`.
/// - Everything else is `Internal`.
fn classify_sqlx_error(err: &sqlx::Error) -> ErrorCode {
    match err {
        sqlx::Error::RowNotFound => ErrorCode::NotFound,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            ErrorCode::AlreadyExists
        }
        _ => ErrorCode::Internal,
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<envy::Error> for AppError {
    fn from(err: envy::Error) -> Self {
        AppError::Validation(format!("invalid configuration: {err}"))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut collected = Vec::new();
        collect_field_errors(&errors, &mut collected);
        // The errors come out of a HashMap; keep the message stable.
        collected.sort_by_key(ToString::to_string);
        AppError::Composite(collected)
    }
}

/// One `Validation` per failing field, nested structs included.
fn collect_field_errors(errors: &validator::ValidationErrors, out: &mut Vec<AppError>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(failures) => {
                out.extend(failures.iter().map(|failure| {
                    let detail = failure
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| failure.code.to_string());
                    AppError::Validation(format!("{field}: {detail}"))
                }));
            }
            ValidationErrorsKind::Struct(inner) => collect_field_errors(inner, out),
            ValidationErrorsKind::List(items) => {
                for inner in items.values() {
                    collect_field_errors(inner, out);
                }
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "NOT_FOUND",
///     "message": "Reservation not found"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();

        if code == ErrorCode::Internal {
            tracing::error!(error = %self, "Request failed with internal error");
        }

        let body = Json(json!({
            "error": {
                "code": code.as_str(),
                "message": self.public_message()
            }
        }));

        (code.status(), body).into_response()
    }
}
