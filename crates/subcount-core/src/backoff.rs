//! Reconnect backoff policy and attempt bookkeeping.
//!
//! [`ReconnectPolicy`] is pure numeric policy: `delay(attempt) =
//! min(cap, base * 2^attempt)` and `should_retry(attempt) = attempt <
//! max_attempts`. [`ReconnectState`] is the counter the session machine owns
//! and feeds into the policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default attempt ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Exponential backoff with a delay cap and an attempt ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, in ms.
    pub base_delay_ms: u64,
    /// Upper bound on any delay, in ms.
    pub max_delay_ms: u64,
    /// Attempts allowed before automatic retry stops.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay in milliseconds before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(31));
        exponential.min(self.max_delay_ms)
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }

    /// Whether another automatic attempt is allowed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Attempt counter for one logical connection slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectState {
    /// Failed or aborted attempts since the last success.
    pub attempt: u32,
    /// When a session last reached `Active`.
    pub last_success_at: Option<DateTime<Utc>>,
}

impl ReconnectState {
    /// Record a failed or aborted connection attempt.
    ///
    /// Returns the attempt index to feed into the policy for this retry
    /// (the value before incrementing).
    pub fn record_failure(&mut self) -> u32 {
        let current = self.attempt;
        self.attempt = self.attempt.saturating_add(1);
        current
    }

    /// Record that a session reached `Active`.
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.attempt = 0;
        self.last_success_at = Some(at);
    }

    /// Clear the attempt counter without touching the success time.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
