//! Quota ceilings and counters.
//!
//! Postgres stores quota columns as nullable `INTEGER`, with `NULL` meaning
//! "no ceiling". Over the wire, unlimited is reported as `-1`. Inside the
//! crate the value is always a [`Quota`], so the sentinel never takes part
//! in arithmetic.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AppError;

/// Wire value used for an unlimited quota.
pub const UNLIMITED_WIRE: i64 = -1;

/// A request ceiling or remaining counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Unlimited,
    Bounded(u32),
}

impl Quota {
    /// Largest bounded value a quota column can hold.
    pub const MAX_BOUNDED: u32 = i32::MAX as u32;

    pub fn is_unlimited(self) -> bool {
        matches!(self, Quota::Unlimited)
    }

    /// The numeric bound, if any.
    pub fn bound(self) -> Option<u32> {
        match self {
            Quota::Unlimited => None,
            Quota::Bounded(n) => Some(n),
        }
    }

    /// Whether at least one more request fits.
    pub fn has_capacity(self) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Bounded(n) => n > 0,
        }
    }

    /// Value reported to callers: `-1` for unlimited.
    pub fn as_wire(self) -> i64 {
        match self {
            Quota::Unlimited => UNLIMITED_WIRE,
            Quota::Bounded(n) => i64::from(n),
        }
    }

    /// Parse a wire value. Any negative value other than `-1`, and anything
    /// above [`Quota::MAX_BOUNDED`], is rejected.
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            UNLIMITED_WIRE => Some(Quota::Unlimited),
            n => u32::try_from(n)
                .ok()
                .filter(|&n| n <= Self::MAX_BOUNDED)
                .map(Quota::Bounded),
        }
    }

    /// Column value: `NULL` for unlimited.
    ///
    /// # Errors
    ///
    /// `Validation` if the bound does not fit the column.
    pub fn to_column(self) -> Result<Option<i32>, AppError> {
        match self {
            Quota::Unlimited => Ok(None),
            Quota::Bounded(n) => i32::try_from(n).map(Some).map_err(|_| {
                AppError::Validation(format!(
                    "quota {n} exceeds the maximum of {}",
                    Self::MAX_BOUNDED
                ))
            }),
        }
    }

    /// Column value back to a quota. A negative stored value is treated as
    /// unlimited so legacy `-1` rows keep their meaning.
    pub fn from_column(value: Option<i32>) -> Self {
        match value {
            Some(n) if n >= 0 => Quota::Bounded(n as u32),
            _ => Quota::Unlimited,
        }
    }
}

impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        Quota::from_wire(raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "quota must be -1 (unlimited) or between 0 and {}, got {raw}",
                Quota::MAX_BOUNDED
            ))
        })
    }
}

/// Ceiling and remaining counter of one environment grant, as returned by a
/// successful decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub max_request: Quota,
    pub available_request: Quota,
}

/// Remaining counter after moving an existing grant from `old_max` to
/// `new_max`.
///
/// Bounded to bounded shifts the counter by the ceiling delta, clamped to
/// `[0, new_max]`. Any transition involving unlimited starts fresh at the
/// new ceiling.
pub fn rebalance_available(old_max: Quota, old_available: Quota, new_max: Quota) -> Quota {
    match (old_max, old_available, new_max) {
        (_, _, Quota::Unlimited) => Quota::Unlimited,
        (Quota::Bounded(old), Quota::Bounded(available), Quota::Bounded(new)) => {
            let shifted = i64::from(available) + i64::from(new) - i64::from(old);
            Quota::Bounded(shifted.clamp(0, i64::from(new)) as u32)
        }
        (_, _, bounded) => bounded,
    }
}
