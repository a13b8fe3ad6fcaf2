//! Retry bookkeeping for the polled streams.
//!
//! The policy is a plain value; the per-stream [`RetryState`] counts
//! consecutive failures and decides between another attempt after a backoff
//! delay and giving up until the next successful response.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{FailureClass, TransportFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Consecutive timeouts tolerated before the stream is considered degraded.
    pub timeout_attempts: u32,
    /// Consecutive non-timeout failures tolerated.
    pub error_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_attempts: 5,
            error_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    pub fn classify(&self, failure: &TransportFailure) -> FailureClass {
        failure.class
    }

    pub fn max_attempts(&self, class: FailureClass) -> u32 {
        match class {
            FailureClass::Timeout => self.timeout_attempts,
            FailureClass::Other => self.error_attempts,
        }
    }

    /// `min(base * 2^attempt, max)`, with `attempt` counted from zero.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryState {
    consecutive_failures: u32,
    last_class: Option<FailureClass>,
    next_delay: Option<Duration>,
}

impl RetryState {
    pub fn record_failure(
        &mut self,
        failure: &TransportFailure,
        policy: &RetryPolicy,
    ) -> RetryDecision {
        let class = policy.classify(failure);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_class = Some(class);

        if self.consecutive_failures >= policy.max_attempts(class) {
            self.next_delay = None;
            return RetryDecision::Exhausted;
        }

        let delay = policy.backoff(self.consecutive_failures - 1);
        self.next_delay = Some(delay);
        RetryDecision::RetryAfter(delay)
    }

    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_class(&self) -> Option<FailureClass> {
        self.last_class
    }

    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..6)
            .map(|attempt| policy.backoff(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000, 5000]);
    }

    #[test]
    fn backoff_survives_huge_attempt_numbers() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(200), Duration::from_millis(5000));
    }

    #[test]
    fn timeouts_get_the_larger_budget() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();
        let failure = TransportFailure::timeout("deadline elapsed");

        for _ in 0..4 {
            assert!(matches!(
                state.record_failure(&failure, &policy),
                RetryDecision::RetryAfter(_)
            ));
        }
        assert_eq!(
            state.record_failure(&failure, &policy),
            RetryDecision::Exhausted
        );
        assert_eq!(state.consecutive_failures(), 5);
        assert_eq!(state.next_delay(), None);
    }

    #[test]
    fn other_errors_exhaust_after_three() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();
        let failure = TransportFailure::other("connection refused");

        assert_eq!(
            state.record_failure(&failure, &policy),
            RetryDecision::RetryAfter(Duration::from_millis(1000))
        );
        assert_eq!(
            state.record_failure(&failure, &policy),
            RetryDecision::RetryAfter(Duration::from_millis(2000))
        );
        assert_eq!(
            state.record_failure(&failure, &policy),
            RetryDecision::Exhausted
        );
        assert_eq!(state.last_class(), Some(FailureClass::Other));
    }

    #[test]
    fn success_resets_counters() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::default();
        state.record_failure(&TransportFailure::other("boom"), &policy);
        state.record_success();
        assert_eq!(state, RetryState::default());
    }
}
