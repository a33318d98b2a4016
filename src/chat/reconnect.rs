//! Reconnect backoff policy
//!
//! After an abnormal close the session waits `base * 2^(attempt-1)`,
//! capped at `max_delay`, before reopening. Once `max_attempts` have been
//! spent the session gives up and stays in the error state.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Exponential backoff with a fixed attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before attempt 1
    pub base_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Attempts allowed before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt, or `None` once the cap is
    /// exceeded.
    ///
    /// # Examples
    ///
    /// ```
    /// use astrochat::chat::ReconnectPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = ReconnectPolicy::default();
    /// assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
    /// assert_eq!(policy.delay_for(3), Some(Duration::from_secs(4)));
    /// assert_eq!(policy.delay_for(6), None);
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        // 2^31 already dwarfs any sane cap; clamp the shift so it cannot overflow.
        let factor = 1u32 << (attempt - 1).min(31);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_until_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay_for(n).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
    }

    #[test]
    fn test_delay_never_exceeds_max() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        };
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(20)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(10), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_no_delay_past_attempt_cap() {
        let policy = ReconnectPolicy::default();
        assert!(policy.delay_for(5).is_some());
        assert!(policy.delay_for(6).is_none());
        assert!(policy.delay_for(0).is_none());
    }

    #[test]
    fn test_huge_attempt_count_does_not_overflow() {
        let policy = ReconnectPolicy {
            max_attempts: u32::MAX,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(200), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_config() {
        let config = ReconnectConfig {
            base_delay_ms: 250,
            max_delay_ms: 2_000,
            max_attempts: 3,
        };
        let policy = ReconnectPolicy::from(&config);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.delay_for(4), None);
    }
}
