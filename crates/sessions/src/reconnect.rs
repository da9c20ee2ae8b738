//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

use cb_domain::config::ReconnectConfig;

/// Controls how a session reconnects after a transient close.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Delay before the first reconnect after a close. Zero reconnects
    /// immediately.
    pub initial_delay: Duration,
    /// Base delay once a reconnect attempt itself has failed.
    pub retry_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Maximum number of consecutive failures before giving up.
    /// `0` means unlimited retries.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectBackoff {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            backoff_factor: cfg.backoff_factor.max(1.0),
            max_attempts: cfg.max_attempts,
        }
    }
}

impl ReconnectBackoff {
    /// Compute the delay for the given attempt number (0-indexed).
    ///
    /// Attempt 0 follows a close and waits `initial_delay`; attempt `n`
    /// follows `n` failed reconnects and grows from `retry_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = if attempt == 0 {
            self.initial_delay.as_millis() as f64
        } else {
            let exp = (attempt - 1).min(i32::MAX as u32) as i32;
            self.retry_delay.as_millis() as f64 * self.backoff_factor.powi(exp)
        };
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        // Add ~25% jitter to prevent thundering herd.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(attempt);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether the given attempt number exceeds the max.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Cheap deterministic "random" fraction [0, 1) based on attempt number.
fn pseudo_random_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64)
}
