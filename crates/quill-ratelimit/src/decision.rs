//! Outcomes of rate-limit checks.

use chrono::{DateTime, Utc};
use quill_core::ceil_secs;
use serde::Serialize;
use std::time::Duration;

/// Result of one `check_and_record` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The event was recorded.
    Admitted {
        /// Events still allowed in the current window.
        remaining: u32,
        /// When the oldest event in the window expires.
        reset_at: DateTime<Utc>,
    },
    /// The event was not recorded.
    Rejected {
        /// Time until the oldest event leaves the window.
        retry_after: Duration,
    },
}

impl Decision {
    /// Returns true if the event was admitted.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Remaining budget, zero for rejections.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        match self {
            Self::Admitted { remaining, .. } => *remaining,
            Self::Rejected { .. } => 0,
        }
    }

    /// Whole seconds to wait before retrying, rounded up and at least one.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Admitted { .. } => None,
            Self::Rejected { retry_after } => Some(ceil_secs(*retry_after)),
        }
    }
}

/// Current state of a window, read without consuming a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Events allowed per window.
    pub limit: u32,
    /// Events still allowed.
    pub remaining: u32,
    /// When the oldest event in the window expires, or now for an empty window.
    pub reset_at: DateTime<Utc>,
    /// Seconds until an event would be admitted, when the budget is spent.
    pub retry_after: Option<u64>,
}
