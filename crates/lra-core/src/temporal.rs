//! # Temporal Types
//!
//! Time limits arrive on the wire as milliseconds relative to "now"; the
//! coordinator stores absolute UTC deadlines. [`TimeLimit`] is the bridge.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A relative time limit in milliseconds. Zero means "no limit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeLimit(u64);

impl TimeLimit {
    /// No time limit.
    pub const NONE: TimeLimit = TimeLimit(0);

    /// Create a time limit from a millisecond count.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Validate a signed millisecond count received from a caller.
    pub fn try_from_signed(millis: i64) -> Result<Self, ValidationError> {
        u64::try_from(millis)
            .map(Self)
            .map_err(|_| ValidationError::InvalidTimeLimit(millis))
    }

    /// The limit in milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whether this limit means "no deadline".
    pub fn is_unlimited(&self) -> bool {
        self.0 == 0
    }

    /// The absolute deadline this limit produces when applied at `now`.
    ///
    /// Returns `None` for an unlimited time limit. Saturates at the maximum
    /// representable timestamp instead of overflowing.
    pub fn deadline_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_unlimited() {
            return None;
        }
        let millis = i64::try_from(self.0).unwrap_or(i64::MAX);
        Some(
            Duration::try_milliseconds(millis)
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}
