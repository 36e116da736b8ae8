//! Data models representing database entities and API payloads.

/// API key model and hashing
pub mod api_key;
pub mod environment;
pub mod project;
/// Quota sum type and counter arithmetic
pub mod quota;
/// Request audit records
pub mod request;
pub mod reservation;
pub mod service;
/// Validation DTOs and failure codes
pub mod validation;
