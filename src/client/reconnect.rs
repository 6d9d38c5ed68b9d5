//! Bounded exponential backoff for re-opening the push channel.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Delay to wait after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// 1-based index of the failed attempt within the current window.
    pub attempt: u32,
    pub delay: Duration,
    /// The window is exhausted and `delay` is the cooldown.
    pub cooldown: bool,
}

/// Tracks failed connection attempts and yields the delay before the next one.
///
/// After `max_attempts` failures the policy waits for the cooldown and starts a
/// fresh window; it never gives up.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Failures recorded in the current window.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget previous failures after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Record a failed attempt and compute how long to wait.
    pub fn record_failure(&mut self) -> Backoff {
        self.attempts += 1;
        let attempt = self.attempts;

        if attempt >= self.config.max_attempts {
            self.attempts = 0;
            return Backoff {
                attempt,
                delay: self.config.cooldown,
                cooldown: true,
            };
        }

        Backoff {
            attempt,
            delay: self.base_delay(attempt) + self.jitter(),
            cooldown: false,
        }
    }

    /// Exponential delay for `attempt`, capped at the configured maximum.
    fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.config
            .initial_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max = u64::try_from(self.config.jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}
