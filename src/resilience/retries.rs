//! Retry policy.
//!
//! # Responsibilities
//! - Bound the number of attempts
//! - Compute the delay before each attempt
//! - Decide whether a failure is worth another attempt
//!
//! # Design Decisions
//! - The retryable predicate is the provider's typed flag, never message text
//! - The policy is a plain value so it can be tested without an orchestrator

use std::time::Duration;

use crate::chain::ProviderError;
use crate::config::schema::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(150),
            max_delay: Duration::from_millis(2000),
            jitter: false,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Sleep before `attempt` (1-based). Zero for the first attempt, then
    /// `base * 2^(attempt-2)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt.saturating_sub(1),
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
            self.jitter,
        )
    }

    /// Whether `attempt` (1-based, just failed with `err`) may be followed by
    /// another.
    pub fn should_retry(&self, attempt: u32, err: &ProviderError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RejectReason;

    fn rejected(reason: RejectReason) -> ProviderError {
        ProviderError::Rejected {
            reason,
            message: "x".into(),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(150));
        assert_eq!(policy.delay_before(3), Duration::from_millis(300));
    }

    #[test]
    fn test_retry_decisions() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, &rejected(RejectReason::MempoolConflict)));
        assert!(policy.should_retry(2, &ProviderError::Timeout(10)));
        assert!(!policy.should_retry(3, &rejected(RejectReason::AlreadyKnown)));
        assert!(!policy.should_retry(1, &rejected(RejectReason::Other)));
    }

    #[test]
    fn test_from_config_never_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter: false,
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }
}
