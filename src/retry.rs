//! Reconnect backoff policy.
//!
//! Controls how the notification supervisor spaces out reconnect attempts
//! after an unplanned stream termination.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Policy controlling reconnect attempts and exponential backoff behavior.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts per stream termination.
    ///
    /// `None` retries indefinitely until a session opens or reconnecting is
    /// disabled.
    pub max_attempts: Option<usize>,
    /// Delay applied after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for exponential backoff delay growth.
    pub max_backoff: Duration,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
}

impl ReconnectPolicy {
    /// Computes the delay to apply after the given failed attempt.
    ///
    /// `attempt` is 1-based; the first reconnect attempt itself runs without
    /// any delay.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..attempt {
            delay = std::cmp::min(delay.saturating_mul(2), self.max_backoff);
        }
        delay + jitter_duration(self.jitter, attempt)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
            jitter: Duration::from_millis(100),
        }
    }
}

fn jitter_duration(max_jitter: Duration, attempt: usize) -> Duration {
    if max_jitter.is_zero() {
        return Duration::ZERO;
    }

    let limit_nanos = max_jitter.as_nanos().min(u64::MAX as u128) as u64;
    if limit_nanos == 0 {
        return Duration::ZERO;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let mixed = now_nanos ^ ((attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    Duration::from_nanos(mixed % (limit_nanos + 1))
}
