//! # Reconnect Backoff
//!
//! Exponential delays `min(base * 2^n, cap)` for a bounded number of
//! attempts. Once the bound is spent, [`Backoff::next_delay`] returns `None`
//! and the caller degrades to polling.

use std::time::Duration;

/// Reconnect attempt counter and delay policy.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    /// A fresh policy.
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap: cap.max(base),
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before reconnect attempt `n` (0-based).
    pub fn delay_for(&self, n: u32) -> Duration {
        let factor = 1u32.checked_shl(n).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Records a failure. Returns the attempt number (1-based) and its delay,
    /// or `None` once every attempt has been used.
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        Some((self.attempt, delay))
    }

    /// Back to zero after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts used since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// The delay cap; also the retry period while polling.
    pub fn cap(&self) -> Duration {
        self.cap
    }
}
