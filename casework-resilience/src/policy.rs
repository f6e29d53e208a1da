//! Retry policy configuration.

use crate::classify::ClassifiedError;
use crate::error::ResilienceError;
use std::time::Duration;

/// Immutable configuration for retry behavior.
///
/// `max_attempts` counts invocations, not re-tries: a policy with
/// `max_attempts = 3` invokes the operation at most three times.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of invocations (at least 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on the computed delay, before jitter.
    pub max_delay: Duration,
    /// Multiplier applied per completed failure (must exceed 1.0).
    pub backoff_factor: f64,
    /// Whether failures are retried automatically. When false, the executor
    /// surfaces state and waits for a manual trigger.
    pub auto_retry: bool,
    /// Retry condition.
    pub retry_on: RetryCondition,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
            auto_retry: true,
            retry_on: RetryCondition::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a new default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of invocations. Values below 1 are clamped to 1.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Disable automatic retries; failures surface state for a manual trigger.
    pub fn manual(mut self) -> Self {
        self.auto_retry = false;
        self
    }

    /// Set the retry condition.
    pub fn retry_on(mut self, condition: RetryCondition) -> Self {
        self.retry_on = condition;
        self
    }

    /// Policy for idempotent reads: three attempts, 1s base, 10s cap.
    pub fn for_reads() -> Self {
        Self::default()
    }

    /// Policy for maker-checker submissions: two attempts, manual re-trigger.
    pub fn for_submissions() -> Self {
        Self::new().max_attempts(2).manual()
    }

    /// Policy that never retries; any failure is terminal.
    pub fn no_retry() -> Self {
        Self::new().max_attempts(1)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.max_attempts < 1 {
            return Err(ResilienceError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_attempts > 1 && self.backoff_factor <= 1.0 {
            return Err(ResilienceError::InvalidPolicy(format!(
                "backoff_factor must exceed 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(ResilienceError::InvalidPolicy(
                "base_delay must not exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Condition deciding whether a classified error is retried.
#[derive(Debug, Clone, Default)]
pub struct RetryCondition {
    /// Custom predicate overriding the classifier's retryable flag.
    pub custom: Option<fn(&ClassifiedError) -> bool>,
}

impl RetryCondition {
    /// Create a condition that follows the classifier's retryable flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom predicate.
    pub fn with_custom(mut self, predicate: fn(&ClassifiedError) -> bool) -> Self {
        self.custom = Some(predicate);
        self
    }

    /// Check whether an error should be retried.
    pub fn should_retry(&self, error: &ClassifiedError) -> bool {
        match self.custom {
            Some(predicate) => predicate(error),
            None => error.retryable,
        }
    }
}
