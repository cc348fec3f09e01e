use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff delays, capped at a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Delay scheduled after the `failed_attempts`-th consecutive failure.
    ///
    /// The first failure waits `initial_delay`, each further failure scales it
    /// by `multiplier`, capped at `max_delay`. The exponent is clamped so the
    /// f64 math cannot overflow for pathological attempt counts.
    #[must_use]
    pub fn delay_for_attempt(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(63) as i32;
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (initial_ms * self.multiplier.powi(exponent)).min(max_ms);
        Duration::from_millis(delay_ms as u64)
    }
}
