//! # Backoff Calculator
//!
//! Exponential backoff for transient job failures: `base * multiplier^(attempt - 1)`
//! capped at the configured maximum, with optional jitter.

use std::time::Duration;

use crate::config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before the next attempt after `attempt` (1-based) failed
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let mut delay_ms = exponential.min(self.config.max_delay_ms as f64) as u64;

        if self.config.jitter_enabled {
            delay_ms = self.apply_jitter(delay_ms);
        }

        Duration::from_millis(delay_ms)
    }

    fn apply_jitter(&self, delay_ms: u64) -> u64 {
        let jitter_range = (delay_ms as f64 * self.config.max_jitter) as u64;
        if jitter_range == 0 {
            return delay_ms;
        }

        let jitter = fastrand::u64(0..=jitter_range);
        if fastrand::bool() {
            delay_ms.saturating_add(jitter).min(self.config.max_delay_ms)
        } else {
            delay_ms.saturating_sub(jitter)
        }
    }
}
