//! API Key model.
//!
//! API keys identify the environment a call is made from. They are stored in
//! the database as SHA-256 hashes; the plaintext key only ever travels in the
//! validation request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Whether a key may be used at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "api_key_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Enabled,
    Disabled,
}

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table. Each key belongs to exactly one environment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    pub status: ApiKeyStatus,

    /// `None` means the key never expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// Last time the key passed validation and consumed quota.
    pub last_used: Option<DateTime<Utc>>,

    /// Environment this key authenticates as
    pub environment_id: Uuid,
}

impl ApiKey {
    pub fn is_enabled(&self) -> bool {
        self.status == ApiKeyStatus::Enabled
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Compute the SHA-256 hex digest of a plaintext API key.
///
/// Used for every lookup: the database never sees the plaintext.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
