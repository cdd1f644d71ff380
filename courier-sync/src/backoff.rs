//! Retry delay policy: exponential backoff with a jitter fraction.

use std::time::Duration;

use courier_core::config::SyncConfig;

/// Timing for the periodic poll and for retries after a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay between successful syncs.
    pub interval: Duration,
    /// First retry delay; doubles with every further consecutive failure.
    pub base: Duration,
    pub max_delay: Duration,
    /// Up to this fraction of the computed delay is added at random.
    pub jitter_ratio: f64,
    /// Failures after which the delay stays at `max_delay` (0 = no cap on
    /// the exponent other than `max_delay` itself). Retries never stop.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            base: config.backoff_base(),
            max_delay: config.backoff_max(),
            jitter_ratio: config.jitter_ratio(),
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before the next attempt, given the consecutive failure count
    /// as it stands after the latest failure.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.delay_with_sample(attempts, rand::random::<f64>())
    }

    /// Deterministic form of [`delay_for`](Self::delay_for); `sample` is a
    /// uniform draw in `[0, 1)`.
    pub fn delay_with_sample(&self, attempts: u32, sample: f64) -> Duration {
        let delay = self.base_delay(attempts);
        let ratio = unit_interval(self.jitter_ratio);
        let sample = unit_interval(sample);
        delay + delay.mul_f64(ratio * sample)
    }

    /// The un-jittered delay: `min(max_delay, base * 2^(attempts - 1))`.
    pub fn base_delay(&self, attempts: u32) -> Duration {
        if self.max_attempts > 0 && attempts >= self.max_attempts {
            return self.max_delay;
        }
        let exponent = attempts.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Largest value [`delay_for`](Self::delay_for) can return for `attempts`.
    pub fn upper_bound(&self, attempts: u32) -> Duration {
        self.delay_with_sample(attempts, 1.0)
    }
}

fn unit_interval(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            interval: Duration::from_secs(30),
            base: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter_ratio: 0.2,
            max_attempts: 8,
        }
    }

    #[test]
    fn test_delay_sequence_doubles() {
        let p = policy();
        assert_eq!(p.base_delay(1), Duration::from_secs(2));
        assert_eq!(p.base_delay(2), Duration::from_secs(4));
        assert_eq!(p.base_delay(3), Duration::from_secs(8));
        assert_eq!(p.base_delay(6), Duration::from_secs(60));
    }

    #[test]
    fn test_consecutive_failures_non_decreasing_within_jitter() {
        let p = policy();
        let mut previous = Duration::ZERO;
        for attempts in 1..=3u32 {
            let expected = Duration::from_secs(2) * (1 << (attempts - 1));
            let d = p.delay_for(attempts);
            assert!(d >= expected, "{d:?} below {expected:?}");
            assert!(d <= expected.mul_f64(1.2), "{d:?} above jitter bound");
            assert!(p.delay_with_sample(attempts, 0.0) >= previous);
            previous = p.upper_bound(attempts);
        }
    }

    #[test]
    fn test_max_attempts_pins_to_max_delay() {
        let p = BackoffPolicy {
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
            ..policy()
        };
        assert_eq!(p.base_delay(2), Duration::from_secs(4));
        assert_eq!(p.base_delay(3), Duration::from_secs(10));
        assert_eq!(p.base_delay(1000), Duration::from_secs(10));
    }

    #[test]
    fn test_huge_attempt_count_does_not_overflow() {
        let p = BackoffPolicy {
            max_attempts: 0,
            ..policy()
        };
        assert_eq!(p.base_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_sample_is_clamped() {
        let p = policy();
        assert_eq!(p.delay_with_sample(1, 0.0), Duration::from_secs(2));
        assert_eq!(p.delay_with_sample(1, 5.0), p.upper_bound(1));
        assert_eq!(p.delay_with_sample(1, f64::NAN), Duration::from_secs(2));
        let none = BackoffPolicy {
            jitter_ratio: 0.0,
            ..policy()
        };
        assert_eq!(none.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_from_config_defaults() {
        let p = BackoffPolicy::default();
        assert_eq!(p.interval, Duration::from_secs(30));
        assert_eq!(p.base, Duration::from_secs(2));
        assert_eq!(p.max_delay, Duration::from_secs(60));
        assert_eq!(p.max_attempts, 8);
    }
}
