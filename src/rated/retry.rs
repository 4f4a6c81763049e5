//! Bounded exponential backoff for rate-limited Rated Network calls.
//!
//! The policy is stateless: every fetch starts again at attempt 0, so a
//! key that exhausted its attempts in one cycle starts fresh the next.

use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_JITTER: (f64, f64) = (0.95, 1.05);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Requests issued per fetch, including the first one.
    pub max_attempts: u32,
    /// Delay after the first rate-limited attempt; doubles each time.
    pub base_delay: Duration,
    /// Uniform multiplier range applied to every delay.
    pub jitter: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            jitter: DEFAULT_JITTER,
        }
    }

    /// Same policy, with every delay exactly `backoff(attempt)`.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = (1.0, 1.0);
        self
    }

    /// Un-jittered delay after the 0-based `attempt`: `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Jittered delay after the 0-based `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let (min, max) = self.jitter;
        let factor = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        self.delay_with_factor(attempt, factor)
    }

    pub fn delay_with_factor(&self, attempt: u32, factor: f64) -> Duration {
        self.backoff(attempt).mul_f64(factor)
    }

    /// Whether another request may follow the 0-based `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.backoff(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_backoff_strictly_increasing() {
        let policy = RetryPolicy::default();
        for attempt in 1..policy.max_attempts {
            assert!(policy.backoff(attempt) > policy.backoff(attempt - 1));
        }
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..policy.max_attempts {
            let base = policy.backoff(attempt).as_secs_f64();
            for _ in 0..50 {
                let d = policy.delay(attempt).as_secs_f64();
                assert!(d >= base * 0.95 - 1e-6, "{d} below lower bound for attempt {attempt}");
                assert!(d <= base * 1.05 + 1e-6, "{d} above upper bound for attempt {attempt}");
            }
        }
    }

    #[test]
    fn test_without_jitter_is_exact() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_with_factor() {
        let policy = RetryPolicy::default();
        let close = |d: Duration, ms: u64| {
            let expected = Duration::from_millis(ms);
            let diff = if d > expected { d - expected } else { expected - d };
            diff < Duration::from_micros(1)
        };
        assert!(close(policy.delay_with_factor(1, 1.05), 2100));
        assert!(close(policy.delay_with_factor(2, 0.95), 3800));
    }

    #[test]
    fn test_bounded_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(8));
        assert!(!policy.should_retry(9), "10th attempt is the last one");
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1));
        assert!(!policy.should_retry(0));
    }

    #[test]
    fn test_backoff_saturates_on_huge_attempt() {
        let policy = RetryPolicy::default();
        assert!(policy.backoff(64) >= policy.backoff(31));
    }
}
