//! Business logic services.
//!
//! Services hold the quota and validation rules and talk to storage only
//! through the repository ports, so handlers stay thin and the flows can be
//! driven by in-memory repositories in tests.

pub mod allocation;
pub mod authorization;
pub mod consumption;
pub mod diagnosis;
pub mod reaper;
pub mod reservation;
pub mod validation_pipeline;
