//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params)
//! 2. Checks the request DTO and hands it to a service
//! 3. Returns the verdict or an error status
pub mod allocations;
pub mod health;
pub mod reservations;
pub mod validation;
