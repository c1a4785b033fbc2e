//! Retry policy for generation failures.
//!
//! The controller consults a [`RetryPolicy`] after every failed generation
//! attempt: the predicate decides whether the error class is worth another
//! try at all, the attempt budget bounds how many tries a unit gets, and the
//! [`Backoff`] decides how long the unit waits before going back to
//! `Pending`.

use std::time::Duration;

use crate::domain::errors::GenerationError;
use crate::domain::models::{IterationConfig, RetryConfig};

/// Predicate deciding which generation errors are retried.
pub type RetryPredicate = fn(&GenerationError) -> bool;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// No delay at all
    None,
    /// The same delay after every failure
    Fixed(Duration),
    /// `initial * 2^n`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `failure`-th consecutive failure (1-based).
    pub fn delay(&self, failure: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let exponent = failure.saturating_sub(1).min(16);
                initial.saturating_mul(1 << exponent).min(max)
            }
        }
    }
}

/// Attempt budget, backoff schedule and retryable predicate.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable: RetryPredicate,
}

impl RetryPolicy {
    /// Policy retrying transient errors only.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            retryable: GenerationError::is_transient,
        }
    }

    pub fn from_config(iteration: &IterationConfig, retry: &RetryConfig) -> Self {
        Self::new(
            iteration.max_attempts_per_unit,
            Backoff::Exponential {
                initial: Duration::from_millis(retry.initial_backoff_ms),
                max: Duration::from_millis(retry.max_backoff_ms),
            },
        )
    }

    #[must_use]
    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// True while a unit that has made `attempts_made` attempts may try again.
    pub const fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    pub fn is_retryable(&self, error: &GenerationError) -> bool {
        (self.retryable)(error)
    }

    /// Whether `error` on attempt `attempts_made` warrants another attempt.
    pub fn should_retry(&self, error: &GenerationError, attempts_made: u32) -> bool {
        self.is_retryable(error) && self.has_attempts_left(attempts_made)
    }

    /// Delay before the next attempt after `consecutive_failures` failures.
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        self.backoff.delay(consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_millis(1000));
        assert_eq!(backoff.delay(500), Duration::from_millis(1000));
    }

    #[test]
    fn test_transient_errors_retry_until_budget() {
        let policy = RetryPolicy::new(3, Backoff::None);
        let throttled = GenerationError::RateLimited("429".into());
        assert!(policy.should_retry(&throttled, 1));
        assert!(policy.should_retry(&throttled, 2));
        assert!(!policy.should_retry(&throttled, 3));
        assert!(!policy.should_retry(&GenerationError::AuthFailure("401".into()), 1));
    }

    #[test]
    fn test_custom_predicate() {
        let policy = RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(5)))
            .with_predicate(|_| true);
        assert!(policy.should_retry(&GenerationError::InvalidResponse("empty".into()), 1));
        assert_eq!(policy.delay_for(3), Duration::from_millis(5));
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&IterationConfig::default(), &RetryConfig::default());
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(60_000));
    }
}
