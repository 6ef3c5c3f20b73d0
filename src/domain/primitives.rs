//! Domain primitives: TimeMs, OwnerId, PositionId, TermDays.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn plus_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_add(ms))
    }

    pub fn plus_days(&self, days: TermDays) -> Self {
        self.plus_ms(days.as_ms())
    }

    /// RFC 3339 rendering for API responses.
    pub fn to_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.0)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_default()
    }
}

/// Owner account identity (numeric user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    pub fn new(id: i64) -> Self {
        OwnerId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position identifier (UUID v4 string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: String) -> Self {
        PositionId(id)
    }

    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        PositionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported term of {0} days")]
pub struct TermDaysError(pub i64);

/// Investment term in days, restricted to the offered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct TermDays(u32);

impl TermDays {
    /// Terms that plans may be offered for.
    pub const ALLOWED: [u32; 6] = [1, 7, 15, 30, 60, 90];

    pub fn new(days: i64) -> Result<Self, TermDaysError> {
        match u32::try_from(days) {
            Ok(d) if Self::ALLOWED.contains(&d) => Ok(TermDays(d)),
            _ => Err(TermDaysError(days)),
        }
    }

    pub fn days(&self) -> u32 {
        self.0
    }

    pub fn as_ms(&self) -> i64 {
        i64::from(self.0) * DAY_MS
    }

    /// Short display label, e.g. "7D".
    pub fn label(&self) -> String {
        format!("{}D", self.0)
    }
}

impl TryFrom<i64> for TermDays {
    type Error = TermDaysError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        TermDays::new(value)
    }
}

impl From<TermDays> for i64 {
    fn from(value: TermDays) -> Self {
        i64::from(value.0)
    }
}

impl fmt::Display for TermDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
