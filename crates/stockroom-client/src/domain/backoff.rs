//! Reconnect delay schedule for the relay connection.
//!
//! The delay doubles on every failed attempt and is capped:
//!
//! ```text
//! attempt:  0     1     2      3      4+
//! delay:    3 s   6 s   12 s   24 s   30 s
//! ```
//!
//! A successful open resets the schedule to attempt 0.

use std::time::Duration;

/// First reconnect delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(3_000);

/// Upper bound on any reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential reconnect backoff: `min(max, base * 2^attempt)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Returns the delay for the current attempt and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Called after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
