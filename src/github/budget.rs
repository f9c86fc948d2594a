//! Remaining-call budget for the remote API.
//!
//! The budget is an explicitly owned value threaded through the client, not
//! ambient state: every response updates it, every call consults it first,
//! and it can never go negative. When the tracked count drops below the
//! low-water mark the client blocks until the reported reset deadline (plus a
//! small margin) has passed.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// GitHub grants 5000 authenticated calls per hour; assume a full window
/// until the first response reports otherwise.
const INITIAL_REMAINING: u32 = 5000;

#[derive(Debug, Clone)]
pub struct RateLimitBudget {
    remaining: u32,
    reset_at: Option<DateTime<Utc>>,
}

impl Default for RateLimitBudget {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitBudget {
    pub fn new() -> Self {
        Self {
            remaining: INITIAL_REMAINING,
            reset_at: None,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }

    /// Fold one response's rate-limit headers into the budget. Absent values
    /// leave the corresponding field unchanged.
    pub fn update(&mut self, remaining: Option<u32>, reset_epoch: Option<i64>) {
        if let Some(remaining) = remaining {
            self.remaining = remaining;
        }
        if let Some(epoch) = reset_epoch {
            self.reset_at = Utc.timestamp_opt(epoch, 0).single();
        }
    }

    /// Account for one issued call. Saturating: the tracked count stops at
    /// zero rather than going negative between header updates.
    pub fn record_call(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// How long to wait before the next call, if the budget is below the
    /// low-water mark. `None` means the call may proceed immediately.
    pub fn required_wait(
        &self,
        low_water_mark: u32,
        margin: Duration,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        if self.remaining >= low_water_mark {
            return None;
        }
        let until_reset = self
            .reset_at
            .and_then(|reset| (reset - now).to_std().ok())
            .unwrap_or(Duration::ZERO);
        Some(until_reset + margin)
    }
}
