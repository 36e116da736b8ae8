//! Application configuration management.
//!
//! Configuration comes from environment variables, deserialized by `envy`
//! into a type-safe struct. A `.env` file is honored when present.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Upper bound on `RESERVATION_TTL_SECS` (30 days).
pub const MAX_RESERVATION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 10
/// - `RESERVATION_TTL_SECS` (optional): reservation lifetime, defaults to 300
/// - `RESERVATION_SWEEP_INTERVAL_SECS` (optional): enables the expired
///   reservation sweeper when set
/// - `RESERVATION_SWEEP_BATCH_SIZE` (optional): reservations reclaimed per
///   sweep, defaults to 100
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: u64,

    #[serde(default)]
    pub reservation_sweep_interval_secs: Option<u64>,

    #[serde(default = "default_sweep_batch_size")]
    pub reservation_sweep_batch_size: u32,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    10
}

fn default_reservation_ttl_secs() -> u64 {
    300
}

fn default_sweep_batch_size() -> u32 {
    100
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a value cannot be
    /// parsed, or a value is out of range.
    pub fn from_env() -> Result<Self, AppError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make reservations unusable.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        if self.reservation_ttl_secs == 0 {
            errors.push(AppError::Validation(
                "RESERVATION_TTL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.reservation_ttl_secs > MAX_RESERVATION_TTL_SECS {
            errors.push(AppError::Validation(format!(
                "RESERVATION_TTL_SECS must be at most {MAX_RESERVATION_TTL_SECS}"
            )));
        }
        if self.reservation_sweep_batch_size == 0 {
            errors.push(AppError::Validation(
                "RESERVATION_SWEEP_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.reservation_sweep_interval_secs == Some(0) {
            errors.push(AppError::Validation(
                "RESERVATION_SWEEP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(AppError::Composite(errors)),
        }
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }

    /// `None` when the sweeper is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.reservation_sweep_interval_secs.map(Duration::from_secs)
    }
}
