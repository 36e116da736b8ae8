//! Postgres implementations of the repository ports.
//!
//! Every adapter is a thin wrapper around the shared [`DbPool`]; cloning one
//! is as cheap as cloning the pool.

mod allocation_repo;
mod api_key_repo;
mod environment_repo;
mod project_repo;
mod request_repo;
mod reservation_repo;
mod service_repo;

pub use allocation_repo::PgQuotaAllocationRepository;
pub use api_key_repo::PgApiKeyRepository;
pub use environment_repo::PgEnvironmentRepository;
pub use project_repo::PgProjectRepository;
pub use request_repo::PgRequestRepository;
pub use reservation_repo::PgReservationRepository;
pub use service_repo::PgServiceRepository;
