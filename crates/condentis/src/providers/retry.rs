use std::time::Duration;

use super::errors::{ProviderError, ProviderErrorKind};

/// Retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Wait before the first retry; doubles on every further retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    Backoff(Duration),
    /// Report the failure, then try again straight away.
    ReportAndContinue,
    /// Report the failure and stop.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// `base_delay * 2^attempt`, with `attempt` counted from zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(30)))
    }

    pub fn decide(&self, error: &ProviderError, attempt: u32) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::Stop;
        }
        if error.is_transient() {
            RetryDecision::Backoff(self.delay(attempt))
        } else if error.kind == ProviderErrorKind::Other {
            RetryDecision::ReportAndContinue
        } else {
            RetryDecision::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_transient_failures_back_off_until_ceiling() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let err = ProviderError::rate_limited("429");
        assert_eq!(policy.decide(&err, 0), RetryDecision::Backoff(Duration::from_millis(10)));
        assert_eq!(policy.decide(&err, 1), RetryDecision::Backoff(Duration::from_millis(20)));
        assert_eq!(policy.decide(&err, 2), RetryDecision::Stop);

        let err = ProviderError::connection("reset");
        assert_eq!(policy.decide(&err, 0), RetryDecision::Backoff(Duration::from_millis(10)));
    }

    #[test]
    fn test_rejected_requests_never_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(&ProviderError::rejected("401"), 0), RetryDecision::Stop);
    }

    #[test]
    fn test_unclassified_failures_continue_without_waiting() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1));
        let err = ProviderError::other("weird");
        assert_eq!(policy.decide(&err, 0), RetryDecision::ReportAndContinue);
        assert_eq!(policy.decide(&err, 1), RetryDecision::Stop);
    }
}
